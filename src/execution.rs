/// Progress of one top-level call, threaded through every redirect hop.
///
/// Lives on the stack of the call; clients never hold one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExecutionState {
    pub(crate) redirects_followed: usize,
    pub(crate) retries_attempted: usize,
}

impl ExecutionState {
    pub fn redirects_followed(&self) -> usize {
        self.redirects_followed
    }

    /// Retries across all hops of the call.
    pub fn retries_attempted(&self) -> usize {
        self.retries_attempted
    }
}
