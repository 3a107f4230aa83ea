#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackSafetyConfig {
    /// Number of times a function's parameter ranges may be widened before
    /// the solver gives up on them and sets them to unknown.
    pub max_iterations: u32,

    /// Emit the analysis report of every function through `tracing`.
    pub print: bool,

    /// Record parameter accesses in module summaries even if no function
    /// asks for memory tagging.
    pub run: bool,

    /// Rerun every node after the solver converged and check nothing changes.
    pub verify_fixed_point: bool,

    /// Run local analyses of different functions in parallel.
    pub parallel: bool,
}

impl StackSafetyConfig {
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_print(mut self, print: bool) -> Self {
        self.print = print;
        self
    }

    pub fn with_run(mut self, run: bool) -> Self {
        self.run = run;
        self
    }

    pub fn with_verify_fixed_point(mut self, verify: bool) -> Self {
        self.verify_fixed_point = verify;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

impl Default for StackSafetyConfig {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            print: false,
            run: false,
            verify_fixed_point: cfg!(debug_assertions),
            parallel: true,
        }
    }
}
