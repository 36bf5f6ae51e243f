use std::path::PathBuf;

use anyhow::Result;
use launchpad_core::{HostVersion, InstalledPayload, LaunchError};
use launchpad_installer::{read_valid_selection, write_selection, LauncherLayout};

/// Signals the user that a changed selection takes effect after the host
/// restarts.
pub trait RestartNotifier {
    fn restart_required(&self, host: &HostVersion, selected: &InstalledPayload);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionSource {
    Persisted,
    OnlyCandidate,
    Newest,
}

impl SelectionSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Persisted => "persisted",
            Self::OnlyCandidate => "only-candidate",
            Self::Newest => "newest",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub entry_path: PathBuf,
    /// Index into the selector's candidates; `None` when a persisted path was
    /// used without any scanned candidate.
    pub index: Option<usize>,
    pub source: SelectionSource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoiceItem {
    pub label: String,
    pub entry_path: PathBuf,
}

/// Selectable list shown when more than one payload is installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionChoice {
    items: Vec<ChoiceItem>,
    current: usize,
}

impl VersionChoice {
    pub fn items(&self) -> &[ChoiceItem] {
        &self.items
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn labels(&self) -> Vec<&str> {
        self.items.iter().map(|item| item.label.as_str()).collect()
    }

    /// Persists `index` and moves the visible current item to it. The current
    /// item is left untouched when persisting fails.
    pub fn select(
        &mut self,
        index: usize,
        selector: &VersionSelector<'_>,
        notifier: &dyn RestartNotifier,
    ) -> Result<PathBuf> {
        let path = selector.persist_selection(index, notifier)?;
        self.current = index;
        Ok(path)
    }
}

pub struct VersionSelector<'a> {
    layout: &'a LauncherLayout,
    host: HostVersion,
    candidates: Vec<InstalledPayload>,
}

impl<'a> VersionSelector<'a> {
    pub fn new(
        layout: &'a LauncherLayout,
        host: HostVersion,
        mut candidates: Vec<InstalledPayload>,
    ) -> Self {
        candidates.sort();
        Self {
            layout,
            host,
            candidates,
        }
    }

    pub fn host(&self) -> &HostVersion {
        &self.host
    }

    pub fn candidates(&self) -> &[InstalledPayload] {
        &self.candidates
    }

    pub fn resolve_default(&self) -> Result<Selection> {
        let persisted = read_valid_selection(self.layout, &self.host);

        match self.candidates.len() {
            0 => persisted
                .map(|entry_path| Selection {
                    entry_path,
                    index: None,
                    source: SelectionSource::Persisted,
                })
                .ok_or_else(|| {
                    anyhow::Error::from(LaunchError::NoPayloadAvailable {
                        host: self.host.to_string(),
                    })
                }),
            1 => Ok(Selection {
                entry_path: self.candidates[0].entry_path(&self.host),
                index: Some(0),
                source: SelectionSource::OnlyCandidate,
            }),
            len => {
                if let Some(persisted) = persisted {
                    if let Some(index) = self
                        .candidates
                        .iter()
                        .position(|candidate| candidate.entry_path(&self.host) == persisted)
                    {
                        return Ok(Selection {
                            entry_path: persisted,
                            index: Some(index),
                            source: SelectionSource::Persisted,
                        });
                    }
                    tracing::info!(
                        host = %self.host,
                        entry = %persisted.display(),
                        "persisted selection matches no installed payload; using newest"
                    );
                }

                let index = len - 1;
                Ok(Selection {
                    entry_path: self.candidates[index].entry_path(&self.host),
                    index: Some(index),
                    source: SelectionSource::Newest,
                })
            }
        }
    }

    pub fn present_choice(&self) -> Result<Option<VersionChoice>> {
        if self.candidates.len() < 2 {
            return Ok(None);
        }

        let resolved = self.resolve_default()?;
        let items = self
            .candidates
            .iter()
            .map(|candidate| ChoiceItem {
                label: candidate.version.display_label(),
                entry_path: candidate.entry_path(&self.host),
            })
            .collect();
        Ok(Some(VersionChoice {
            items,
            current: resolved.index.unwrap_or(self.candidates.len() - 1),
        }))
    }

    pub fn persist_selection(
        &self,
        index: usize,
        notifier: &dyn RestartNotifier,
    ) -> Result<PathBuf> {
        let candidate = self
            .candidates
            .get(index)
            .ok_or(LaunchError::SelectionOutOfRange {
                index,
                len: self.candidates.len(),
            })?;

        let entry_path = candidate.entry_path(&self.host);
        write_selection(self.layout, &self.host, &entry_path)?;
        tracing::info!(
            host = %self.host,
            version = %candidate.version,
            entry = %entry_path.display(),
            "payload selection changed; host restart required"
        );
        notifier.restart_required(&self.host, candidate);
        Ok(entry_path)
    }
}
