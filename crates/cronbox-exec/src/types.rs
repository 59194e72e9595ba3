/// Result of asking the runner to execute a resolved command.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// The resolved command was empty — nothing was executed. Not a failure.
    Skipped,
    /// A process was spawned (or spawning was attempted) and finished.
    Completed(RunReport),
}

/// What one finished execution looked like.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// True iff the process was spawned and exited with status zero.
    pub success: bool,
    /// Combined stdout + stderr text. Stdout comes first; the interleaving
    /// order between the two streams is not preserved.
    pub output: String,
    /// Populated on spawn failure or non-zero exit.
    pub error: Option<String>,
    /// Wall-clock runtime in milliseconds.
    pub duration_ms: i64,
}
