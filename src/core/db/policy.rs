/// One retrievable piece of the policy rulebook
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyChunk {
    /// Zero-based page, when the source had page breaks
    pub page: Option<i64>,
    pub content: String,
}

pub trait PolicyRepository {
    /// Drop the stored rulebook and store `chunks` in their order
    fn replace_policy_chunks(&self, chunks: &[PolicyChunk]) -> impl Future<Output = anyhow::Result<()>> + Send;
    fn get_policy_chunks(&self) -> impl Future<Output = anyhow::Result<Vec<PolicyChunk>>> + Send;
}
