#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Stop after this many cycles. `None` polls until shut down.
    pub max_cycles: Option<u64>,
}

impl RunOptions {
    pub fn once() -> RunOptions {
        RunOptions {
            max_cycles: Some(1),
        }
    }
}
