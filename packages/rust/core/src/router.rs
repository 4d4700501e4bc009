//! Task kinds, queue names, and the static routing table.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use meetnews_shared::{MeetNewsError, Result, RouteEntry};

/// Kinds of task the broker knows how to carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// The enrichment orchestrator.
    ProcessNews,
    /// Similarity ranking, delegated by the orchestrator.
    RankSimilarity,
}

impl TaskKind {
    pub const ALL: [TaskKind; 2] = [TaskKind::ProcessNews, TaskKind::RankSimilarity];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProcessNews => "process_news",
            Self::RankSimilarity => "rank_similarity",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = MeetNewsError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| MeetNewsError::config(format!("unknown task kind '{s}'")))
    }
}

/// The two worker pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueName {
    /// General-purpose I/O pool.
    Default,
    /// Ranking pool, sized for the scoring model.
    Dedicated,
}

impl QueueName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Dedicated => "dedicated",
        }
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueName {
    type Err = MeetNewsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "default" => Ok(Self::Default),
            "dedicated" => Ok(Self::Dedicated),
            other => Err(MeetNewsError::config(format!("unknown queue '{other}'"))),
        }
    }
}

/// Static task-kind to queue mapping.
///
/// Ranking always goes to the dedicated queue and nothing else may run
/// there; everything unlisted goes to the default queue.
#[derive(Debug, Clone)]
pub struct Router {
    routes: HashMap<TaskKind, QueueName>,
}

impl Default for Router {
    fn default() -> Self {
        Self {
            routes: HashMap::from([(TaskKind::RankSimilarity, QueueName::Dedicated)]),
        }
    }
}

impl Router {
    /// Build from configured overrides, validated up front.
    pub fn from_config(entries: &[RouteEntry]) -> Result<Self> {
        let mut router = Self::default();
        for entry in entries {
            let kind: TaskKind = entry.task.parse()?;
            let queue: QueueName = entry.queue.parse()?;
            let ranking = kind == TaskKind::RankSimilarity;
            if ranking && queue != QueueName::Dedicated {
                return Err(MeetNewsError::config(format!(
                    "'{kind}' must run on the dedicated queue, not '{queue}'"
                )));
            }
            if !ranking && queue == QueueName::Dedicated {
                return Err(MeetNewsError::config(format!(
                    "the dedicated queue only runs ranking, cannot route '{kind}' there"
                )));
            }
            router.routes.insert(kind, queue);
        }
        Ok(router)
    }

    pub fn route(&self, kind: TaskKind) -> QueueName {
        self.routes.get(&kind).copied().unwrap_or(QueueName::Default)
    }
}
