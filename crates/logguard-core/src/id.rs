use crate::error::IdGenerationError;
use uuid::Uuid;

/// Capability that hands out unique event identifiers
pub trait IdGenerator: Send + Sync {
    fn generate(&self) -> Result<String, IdGenerationError>;
}

/// Time-ordered UUID (v7) generator
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidGenerator;

impl UuidGenerator {
    pub fn new() -> Self {
        Self
    }
}

impl IdGenerator for UuidGenerator {
    fn generate(&self) -> Result<String, IdGenerationError> {
        Ok(Uuid::now_v7().to_string())
    }
}
