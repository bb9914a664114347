/// Credentials published by the first module in the chain to validate a
/// name/password pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirstPass {
    pub name: String,
    pub password: String,
}

/// Shared state for one authentication attempt, passed by reference
/// through the configured module chain. The first module to validate
/// publishes its credentials here; downstream modules configured with
/// `use_first_pass` reuse them instead of collecting and re-validating.
/// Later modules never overwrite an existing first pass.
#[derive(Debug, Default)]
pub struct AttemptContext {
    first_pass: Option<FirstPass>,
}

impl AttemptContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish validated credentials for downstream modules. A no-op when
    /// an earlier module already published: the first pass wins.
    pub fn publish_first_pass(&mut self, name: impl Into<String>, password: impl Into<String>) {
        if self.first_pass.is_none() {
            self.first_pass = Some(FirstPass {
                name: name.into(),
                password: password.into(),
            });
        }
    }

    pub fn first_pass(&self) -> Option<&FirstPass> {
        self.first_pass.as_ref()
    }
}
