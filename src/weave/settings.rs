/// Knobs for one weaving run
#[derive(Clone, Debug)]
pub struct Settings {
    /// Use `brtrue.s`/`brfalse.s` when closing a block whose end is within reach
    ///
    /// Turning this off always emits the 5-byte long forms. That leaves room for markers that
    /// keep inserting code inside blocks after they've been closed.
    pub allow_short_branches: bool,

    /// Abort the whole run on the first member that fails to weave
    ///
    /// By default, the failing member is rolled back and reported, and weaving carries on with
    /// the next one.
    pub stop_on_first_failure: bool,

    /// Reject finishing a writer while structured blocks are still open
    pub finish_requires_closed_blocks: bool,
}

impl Default for Settings {
    fn default() -> Settings {
        Settings {
            allow_short_branches: true,
            stop_on_first_failure: false,
            finish_requires_closed_blocks: true,
        }
    }
}
