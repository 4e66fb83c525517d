use std::io::Cursor;
use std::sync::Arc;

use docfraud::Config;
use docfraud::copilot::Copilot;
use docfraud::core::db::{CompanyRepository, FraudDb, NewCompany};
use docfraud::detection::DocumentAnalyzer;
use docfraud::detection::ocr::TextExtractor;
use docfraud::models::TextRegion;
use docfraud::server::{self, AppState};
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb, RgbImage};
use tempfile::TempDir;

/// Returns fixed text lines whatever the image
pub struct MockExtractor {
    pub lines: Vec<TextRegion>,
}

impl TextExtractor for MockExtractor {
    fn extract(&self, _image: &DynamicImage) -> anyhow::Result<Vec<TextRegion>> {
        Ok(self.lines.clone())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Lines sharing one margin with even spacing
pub fn aligned_lines(texts: &[&str]) -> Vec<TextRegion> {
    texts
        .iter()
        .enumerate()
        .map(|(i, text)| {
            let top = 20.0 + i as f32 * 24.0;
            TextRegion::from_rect(*text, 0.9, 40.0, top, 300.0, top + 14.0)
        })
        .collect()
}

/// Four lines whose margins drift a few pixels and whose spacing jumps
pub fn jittered_lines() -> Vec<TextRegion> {
    [(10.0, 0.0), (15.0, 10.0), (21.0, 300.0), (28.0, 310.0)]
        .iter()
        .map(|&(left, top)| TextRegion::from_rect("line", 0.9, left, top, left + 120.0, top + 8.0))
        .collect()
}

pub fn analyzer_with_lines(lines: Vec<TextRegion>) -> DocumentAnalyzer {
    DocumentAnalyzer::new(Default::default(), Arc::new(MockExtractor { lines }))
}

/// Uniform mid-gray page; survives a JPEG resave unchanged
pub fn flat_page(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([128, 128, 128])))
}

/// Deterministic high-frequency noise, which JPEG cannot reproduce
pub fn noisy_page(width: u32, height: u32) -> DynamicImage {
    let img: RgbImage = ImageBuffer::from_fn(width, height, |x, y| {
        let v = (x.wrapping_mul(7919) ^ y.wrapping_mul(104_729) ^ x.wrapping_mul(y).wrapping_mul(31)) % 256;
        Rgb([v as u8, (v as u8).wrapping_mul(3), 255 - v as u8])
    });
    DynamicImage::ImageRgb8(img)
}

pub fn png_bytes(img: &DynamicImage) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    img.write_to(&mut buffer, ImageFormat::Png)
        .expect("Failed to encode test PNG");
    buffer.into_inner()
}

/// Config whose database, uploads and policy document live in `dir`
pub fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.storage.database_url = format!("sqlite:///{}", dir.path().join("fraud.db").display());
    config.storage.upload_dir = dir.path().join("uploads");
    config.copilot.policy_doc = dir.path().join("policy.txt");
    config.ocr.enabled = false;
    config
}

/// Creates a FraudDb in a temporary directory.
/// Returns both the database and the directory (which must be kept alive).
pub async fn create_test_db() -> (FraudDb, TempDir) {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let db = FraudDb::new(dir.path().join("fraud.db"))
        .await
        .expect("Failed to create test database");
    (db, dir)
}

pub fn new_company(name: &str, credits: i64) -> NewCompany {
    NewCompany {
        name: name.to_string(),
        credits,
    }
}

pub async fn add_company(db: &FraudDb, name: &str, credits: i64) -> anyhow::Result<String> {
    Ok(db.add_company(&new_company(name, credits)).await?.api_key)
}

pub const POLICY_TEXT: &str = "KYC Policy Rulebook\n\n\
Identity verification must use a government-issued photo ID such as a passport or national ID card.\n\n\
\u{000C}Proof of address must be a utility bill or bank statement issued within the last three months.\n\n\
\u{000C}Suspected document tampering is escalated to the Fraud Investigation Team together with the ELA heatmap.";

/// A running API server on an ephemeral port
pub struct TestServer {
    pub base_url: String,
    pub db: FraudDb,
    pub config: Config,
    pub dir: TempDir,
    handle: tokio::task::JoinHandle<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub async fn spawn_server(
    lines: Vec<TextRegion>,
    configure: impl FnOnce(&mut Config),
) -> anyhow::Result<TestServer> {
    let dir = TempDir::new()?;
    let mut config = test_config(&dir);
    configure(&mut config);
    std::fs::write(&config.copilot.policy_doc, POLICY_TEXT)?;

    let db = FraudDb::new(config.storage.database_path()?).await?;
    let copilot = Copilot::init(&db, &config.copilot).await?;
    let state = AppState::new(config.clone(), db.clone(), analyzer_with_lines(lines), copilot);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let base_url = format!("http://{}", listener.local_addr()?);
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, server::build_router(state)).await;
    });

    Ok(TestServer {
        base_url,
        db,
        config,
        dir,
        handle,
    })
}
