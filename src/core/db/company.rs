/// Client organisation buying scans with prepaid credits
#[derive(Debug, Clone)]
pub struct Company {
    pub id: i64,
    pub name: String,
    pub api_key: String,
    pub credits_remaining: i64,
    pub(super) _guard: (),
}

#[derive(Debug, Clone)]
pub struct NewCompany {
    pub name: String,
    pub credits: i64,
}

/// What happened when a request tried to spend one credit
#[derive(Debug, Clone)]
pub enum ChargeOutcome {
    /// Credit deducted; the company as it is after the charge
    Charged(Company),
    UnknownKey,
    Exhausted(Company),
}

pub trait CompanyRepository {
    fn add_company(&self, company: &NewCompany) -> impl Future<Output = anyhow::Result<Company>> + Send;
    fn get_company_by_name(&self, name: &str) -> impl Future<Output = anyhow::Result<Option<Company>>> + Send;
    fn get_company_by_api_key(&self, api_key: &str) -> impl Future<Output = anyhow::Result<Option<Company>>> + Send;
    fn get_companies(&self) -> impl Future<Output = anyhow::Result<Vec<Company>>> + Send;
    fn top_up_credits(&self, name: &str, credits: i64) -> impl Future<Output = anyhow::Result<Option<Company>>> + Send;
    fn charge_credit(&self, api_key: &str) -> impl Future<Output = anyhow::Result<ChargeOutcome>> + Send;
}
