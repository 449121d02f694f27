use research_core::TokenUsage;

pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> u64;
}

/// Simple, deterministic whitespace tokenizer used when a backend reports no usage.
#[derive(Debug, Default, Clone, Copy)]
pub struct WhitespaceTokenCounter;

impl TokenCounter for WhitespaceTokenCounter {
    fn count(&self, text: &str) -> u64 {
        text.split_whitespace().count() as u64
    }
}

pub fn estimate_usage(counter: &dyn TokenCounter, prompt: &str, response: &str) -> TokenUsage {
    TokenUsage::new(counter.count(prompt), counter.count(response))
}
