//! In-memory baseline source for testing and development

use async_trait::async_trait;

use crate::traits::BaselineSource;
use crate::types::{BaselineFrames, ReconcileResult};

/// `BaselineSource` backed by frames held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryBaselineSource {
    frames: BaselineFrames,
}

impl MemoryBaselineSource {
    /// Source with empty template frames for every sheet.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_frames(frames: BaselineFrames) -> Self {
        Self { frames }
    }
}

#[async_trait]
impl BaselineSource for MemoryBaselineSource {
    async fn load_baseline(&self) -> ReconcileResult<BaselineFrames> {
        Ok(self.frames.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Sheet;

    #[tokio::test]
    async fn test_memory_source_returns_all_sheets() {
        let source = MemoryBaselineSource::new();
        let frames = source.load_baseline().await.unwrap();
        for sheet in Sheet::ALL {
            assert!(frames.get(sheet).is_empty());
        }
    }
}
