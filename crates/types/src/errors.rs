use thiserror::Error;

// ============================================================================
// Main Error Enum
// ============================================================================

/// Errors raised while building or validating shared chain types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TypesError {
    // ========================================================================
    // Creator Share Errors
    // ========================================================================
    
    /// Creator list is empty where at least one share is required
    #[error("Creator parts are empty")]
    EmptyParts,
    
    /// Creator shares do not add up to a full 10000 bps
    #[error("Creator parts sum to {total} bps (expected {expected})")]
    InvalidPartsTotal { total: u32, expected: u32 },
    
    // ========================================================================
    // Log Identity Errors
    // ========================================================================
    
    /// Log id string could not be interpreted
    #[error("Invalid log id '{0}'")]
    InvalidLogId(String),
}
