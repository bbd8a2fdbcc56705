//! Storage root resolution.
//!
//! An explicit root is used verbatim and disables ancestor discovery, which
//! keeps automation deterministic. Implicit mode probes the working directory
//! first and then its ancestors for the canonical marker directory. Discovery
//! is a pure function over an [`FsProbe`] so it can be tested without
//! touching the real filesystem.

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{TeamError, TeamResult};

/// Canonical marker subdirectory holding per-team state.
pub const TEAM_MARKER: &str = ".agent-teams/teams";

/// Filesystem probe used during discovery.
pub trait FsProbe {
    fn is_dir(&self, path: &Path) -> bool;
}

/// Probe backed by the real filesystem.
#[derive(Debug, Default)]
pub struct RealFs;

impl FsProbe for RealFs {
    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }
}

/// Outcome of root resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRoot {
    /// Directory holding one subtree per team.
    pub path: PathBuf,
    /// Whether an implicit ancestor auto-switch occurred.
    pub auto_switched: bool,
}

/// Resolve the storage root for an existing team.
///
/// Order: explicit override (must be a directory), then the default marker
/// under `cwd` when it already holds the team, then a unique ancestor marker
/// holding the team. Zero or several ancestor candidates with the team absent
/// at the default location is an error rather than a guess.
pub fn resolve_root(
    explicit: Option<&Path>,
    cwd: &Path,
    team: &str,
    probe: &dyn FsProbe,
) -> TeamResult<ResolvedRoot> {
    if let Some(root) = explicit {
        if !probe.is_dir(root) {
            return Err(TeamError::RootNotADirectory {
                path: root.to_path_buf(),
            });
        }
        return Ok(ResolvedRoot {
            path: root.to_path_buf(),
            auto_switched: false,
        });
    }

    let default_root = cwd.join(TEAM_MARKER);
    if probe.is_dir(&default_root.join(team)) {
        return Ok(ResolvedRoot {
            path: default_root,
            auto_switched: false,
        });
    }

    let mut candidates: Vec<PathBuf> = Vec::new();
    for dir in cwd.ancestors().skip(1) {
        let marker = dir.join(TEAM_MARKER);
        if probe.is_dir(&marker.join(team)) {
            candidates.push(marker);
        }
    }

    match candidates.len() {
        1 => {
            let path = candidates.remove(0);
            warn!(
                root = %path.display(),
                team,
                "auto-switched to ancestor team storage"
            );
            Ok(ResolvedRoot {
                path,
                auto_switched: true,
            })
        }
        0 => {
            if probe.is_dir(&default_root) {
                // Marker exists but the team does not; later lookups report
                // the missing team with its expected path.
                Ok(ResolvedRoot {
                    path: default_root,
                    auto_switched: false,
                })
            } else {
                Err(TeamError::RootUnresolved {
                    team: team.to_string(),
                    guidance: format!(
                        "no '{TEAM_MARKER}' directory found in {} or its ancestors; \
                         run init here or pass an explicit --root",
                        cwd.display()
                    ),
                })
            }
        }
        n => Err(TeamError::RootUnresolved {
            team: team.to_string(),
            guidance: format!(
                "{n} ancestor directories contain team '{team}'; \
                 pass an explicit --root to pick one"
            ),
        }),
    }
}

/// Resolve the storage root for `init`, which may create the team.
///
/// Explicit override still must be a directory; otherwise the default marker
/// under `cwd` is used (and created later by the caller). Discovery never
/// auto-switches for init: new teams are seeded where the caller stands.
pub fn resolve_root_for_init(
    explicit: Option<&Path>,
    cwd: &Path,
    probe: &dyn FsProbe,
) -> TeamResult<ResolvedRoot> {
    if let Some(root) = explicit {
        if !probe.is_dir(root) {
            return Err(TeamError::RootNotADirectory {
                path: root.to_path_buf(),
            });
        }
        return Ok(ResolvedRoot {
            path: root.to_path_buf(),
            auto_switched: false,
        });
    }
    Ok(ResolvedRoot {
        path: cwd.join(TEAM_MARKER),
        auto_switched: false,
    })
}
