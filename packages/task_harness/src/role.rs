/// The part a process plays in a (possibly) multi-process execution of a task.
///
/// Only the distinguished process is guaranteed to hold the authoritative input and output
/// data. Participants take part in the computation, may legitimately hold empty descriptors
/// and must not be assumed to see final results.
///
/// Single-process tasks are always distinguished.
///
/// # Examples
///
/// ```
/// use task_harness::ProcessRole;
///
/// assert_eq!(ProcessRole::from_rank(0), ProcessRole::Distinguished);
/// assert_eq!(ProcessRole::from_rank(3), ProcessRole::Participant);
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, derive_more::Display)]
#[expect(
    clippy::exhaustive_enums,
    reason = "a process either is the distinguished one or it is not"
)]
pub enum ProcessRole {
    /// The process that owns the authoritative data and reports results.
    #[default]
    #[display("distinguished")]
    Distinguished,

    /// Any other cooperating process.
    #[display("participant")]
    Participant,
}

impl ProcessRole {
    /// The rank of the distinguished process in a group of cooperating processes.
    pub const DISTINGUISHED_RANK: usize = 0;

    /// Derives the role of the process with the given rank.
    #[must_use]
    pub fn from_rank(rank: usize) -> Self {
        if rank == Self::DISTINGUISHED_RANK {
            Self::Distinguished
        } else {
            Self::Participant
        }
    }

    /// Whether this is the distinguished role.
    #[must_use]
    pub fn is_distinguished(self) -> bool {
        matches!(self, Self::Distinguished)
    }
}
