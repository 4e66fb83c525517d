#![allow(dead_code)]

mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from docfraud for tests
pub use docfraud::core::db::{
    ChargeOutcome, Company, CompanyRepository, FraudDb, NewCompany, NewScan, PolicyChunk,
    PolicyRepository, ScanRecord, ScanRepository,
};
pub use docfraud::models::{Classification, DocumentReport};
