//! The saved-prompt library: folders, prompts with version history, a
//! trash bin, template variables and portable share codes.
//!
//! Exactly one folder is flagged as the default at all times. Operations
//! that depend on it call [`PromptLibrary::ensure_default_folder`] first,
//! so a library loaded from damaged data heals itself.

use std::collections::{HashMap, HashSet};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};

pub const DEFAULT_FOLDER_ID: &str = "default";
pub const DEFAULT_FOLDER_NAME: &str = "Uncategorized";
pub const SHARE_FORMAT_VERSION: &str = "2.0";

// ---------------------------------------------------------------------------
// Data structures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub text: String,
    pub name: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vote {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rating {
    pub up: u32,
    pub down: u32,
    pub user_rating: Option<Vote>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    pub id: String,
    pub name: String,
    pub text: String,
    #[serde(default)]
    pub favorite: bool,
    #[serde(default)]
    pub usage_count: u32,
    #[serde(default)]
    pub last_used: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub modified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    pub folder_id: String,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub rating: Rating,
}

impl Prompt {
    /// Version number of the current text.
    pub fn version(&self) -> usize {
        self.history.len() + 1
    }

    fn snapshot(&mut self, now: DateTime<Utc>) {
        self.history.push(HistoryEntry {
            text: self.text.clone(),
            name: self.name.clone(),
            timestamp: now,
        });
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Folder {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub expanded: bool,
}

impl Folder {
    fn default_folder() -> Self {
        Self {
            id: DEFAULT_FOLDER_ID.to_string(),
            name: DEFAULT_FOLDER_NAME.to_string(),
            is_default: true,
            parent_id: None,
            expanded: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrashedPrompt {
    pub prompt: Prompt,
    pub deleted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewPrompt {
    pub name: String,
    pub text: String,
    /// `None` files the prompt under the default folder.
    pub folder_id: Option<String>,
    pub source_url: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PromptEdit {
    pub name: Option<String>,
    pub text: Option<String>,
    pub folder_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Version {
    pub version: usize,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub current: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
    /// Append imported prompts and folders to the library.
    Merge,
    /// Replace every prompt and non-default folder. Trash is kept.
    Replace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub prompts: usize,
    pub folders: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptLibrary {
    #[serde(default)]
    prompts: Vec<Prompt>,
    #[serde(default)]
    folders: Vec<Folder>,
    #[serde(default)]
    trash: Vec<TrashedPrompt>,
}

// ---------------------------------------------------------------------------
// Share-code wire format
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct OutgoingBundle<'a> {
    export_date: DateTime<Utc>,
    version: &'static str,
    prompt_count: usize,
    folder_count: usize,
    folders: &'a [Folder],
    prompts: &'a [Prompt],
}

#[derive(Deserialize)]
struct IncomingBundle {
    #[serde(default)]
    folders: Vec<IncomingFolder>,
    prompts: Vec<IncomingPrompt>,
}

#[derive(Deserialize)]
struct IncomingFolder {
    id: String,
    name: String,
    #[serde(default, alias = "isDefault")]
    is_default: bool,
    #[serde(default, alias = "parentId")]
    parent_id: Option<String>,
}

/// Codes from older exports may lack any field but `name` and `text`, and
/// browser-made codes use camelCase keys with millisecond timestamps.
#[derive(Deserialize)]
struct IncomingPrompt {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    favorite: Option<bool>,
    #[serde(default, alias = "usageCount")]
    usage_count: Option<u32>,
    #[serde(default, alias = "lastUsed")]
    last_used: Option<Stamp>,
    #[serde(default, alias = "createdAt")]
    created_at: Option<Stamp>,
    #[serde(default)]
    history: Option<Vec<IncomingHistory>>,
    #[serde(default, alias = "folderId")]
    folder_id: Option<String>,
    #[serde(default, alias = "sourceUrl")]
    source_url: Option<String>,
}

#[derive(Deserialize)]
struct IncomingHistory {
    text: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    timestamp: Option<Stamp>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Stamp {
    Millis(i64),
    Text(DateTime<Utc>),
}

impl Stamp {
    fn into_utc(self) -> Option<DateTime<Utc>> {
        match self {
            Stamp::Millis(ms) => DateTime::from_timestamp_millis(ms),
            Stamp::Text(t) => Some(t),
        }
    }
}

static VARIABLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\{(\w+)\}\}").unwrap());

fn new_prompt_id() -> String {
    Uuid::new_v4().to_string()
}

fn new_folder_id() -> String {
    format!("folder_{}", Uuid::new_v4().simple())
}

fn required(field: &'static str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::invalid(field, "must not be empty"));
    }
    Ok(trimmed.to_string())
}

// ---------------------------------------------------------------------------
// Library
// ---------------------------------------------------------------------------

impl PromptLibrary {
    pub fn new() -> Self {
        let mut library = Self::default();
        library.ensure_default_folder();
        library
    }

    /// Rebuild a library from stored parts, healing the default folder.
    pub fn from_parts(prompts: Vec<Prompt>, folders: Vec<Folder>, trash: Vec<TrashedPrompt>) -> Self {
        let mut library = Self {
            prompts,
            folders,
            trash,
        };
        library.ensure_default_folder();
        library
    }

    pub fn prompts(&self) -> &[Prompt] {
        &self.prompts
    }

    pub fn folders(&self) -> &[Folder] {
        &self.folders
    }

    pub fn trash(&self) -> &[TrashedPrompt] {
        &self.trash
    }

    pub fn prompt(&self, id: &str) -> Result<&Prompt> {
        self.prompts
            .iter()
            .find(|p| p.id == id)
            .ok_or_else(|| Error::not_found("prompt", id))
    }

    fn prompt_mut(&mut self, id: &str) -> Result<&mut Prompt> {
        self.prompts
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| Error::not_found("prompt", id))
    }

    pub fn folder(&self, id: &str) -> Result<&Folder> {
        self.folders
            .iter()
            .find(|f| f.id == id)
            .ok_or_else(|| Error::not_found("folder", id))
    }

    // -- folders -----------------------------------------------------------

    /// Make sure exactly one default folder exists and return its id.
    pub fn ensure_default_folder(&mut self) -> String {
        let mut defaults = self.folders.iter_mut().filter(|f| f.is_default);
        if let Some(first) = defaults.next() {
            let id = first.id.clone();
            let mut extra = 0;
            for folder in defaults {
                folder.is_default = false;
                extra += 1;
            }
            if extra > 0 {
                warn!(kept = %id, cleared = extra, "multiple default folders");
            }
            return id;
        }

        if let Some(folder) = self.folders.iter_mut().find(|f| f.id == DEFAULT_FOLDER_ID) {
            folder.is_default = true;
            warn!("default folder flag was missing; restored");
            return folder.id.clone();
        }

        if !self.folders.is_empty() || !self.prompts.is_empty() {
            warn!("default folder was missing; recreated");
        }
        let folder = Folder::default_folder();
        let id = folder.id.clone();
        self.folders.insert(0, folder);
        id
    }

    pub fn add_folder(&mut self, name: &str, parent_id: Option<&str>) -> Result<String> {
        let name = required("name", name)?;
        let lower = name.to_lowercase();
        if self.folders.iter().any(|f| f.name.to_lowercase() == lower) {
            return Err(Error::invalid(
                "name",
                format!("a folder named '{name}' already exists"),
            ));
        }
        if let Some(parent) = parent_id {
            self.folder(parent)?;
        }

        let id = new_folder_id();
        self.folders.push(Folder {
            id: id.clone(),
            name,
            is_default: false,
            parent_id: parent_id.map(str::to_string),
            expanded: false,
        });
        info!(folder = %id, "created folder");
        Ok(id)
    }

    /// Delete a folder. Its prompts move to the default folder and its
    /// subfolders move up to its parent.
    pub fn delete_folder(&mut self, id: &str) -> Result<()> {
        let folder = self.folder(id)?;
        if folder.is_default {
            return Err(Error::DefaultFolder(folder.name.clone()));
        }
        let parent = folder.parent_id.clone();
        self.folders.retain(|f| f.id != id);

        let default_id = self.ensure_default_folder();
        let mut moved = 0;
        for prompt in self.prompts.iter_mut().filter(|p| p.folder_id == id) {
            prompt.folder_id = default_id.clone();
            moved += 1;
        }
        for child in self
            .folders
            .iter_mut()
            .filter(|f| f.parent_id.as_deref() == Some(id))
        {
            child.parent_id = parent.clone();
        }
        info!(folder = %id, moved, "deleted folder");
        Ok(())
    }

    /// Flip a folder's expanded state, returning the new state.
    pub fn toggle_folder(&mut self, id: &str) -> Result<bool> {
        let folder = self
            .folders
            .iter_mut()
            .find(|f| f.id == id)
            .ok_or_else(|| Error::not_found("folder", id))?;
        folder.expanded = !folder.expanded;
        Ok(folder.expanded)
    }

    // -- prompts -----------------------------------------------------------

    pub fn add_prompt(&mut self, new: NewPrompt) -> Result<String> {
        let name = required("name", &new.name)?;
        let text = required("text", &new.text)?;
        let folder_id = match new.folder_id {
            Some(folder) => self.folder(&folder)?.id.clone(),
            None => self.ensure_default_folder(),
        };

        let id = new_prompt_id();
        self.prompts.push(Prompt {
            id: id.clone(),
            name,
            text,
            favorite: false,
            usage_count: 0,
            last_used: None,
            created_at: Utc::now(),
            modified_at: None,
            history: Vec::new(),
            folder_id,
            source_url: new.source_url,
            rating: Rating::default(),
        });
        info!(prompt = %id, "created prompt");
        Ok(id)
    }

    /// Apply an edit. A changed text pushes the previous text and name onto
    /// the prompt's history.
    pub fn edit_prompt(&mut self, id: &str, edit: PromptEdit) -> Result<()> {
        let name = edit.name.as_deref().map(|n| required("name", n)).transpose()?;
        let text = edit.text.as_deref().map(|t| required("text", t)).transpose()?;
        if let Some(folder) = &edit.folder_id {
            self.folder(folder)?;
        }

        let prompt = self.prompt_mut(id)?;
        let now = Utc::now();
        if let Some(text) = text {
            if text != prompt.text {
                prompt.snapshot(now);
                prompt.text = text;
                prompt.modified_at = Some(now);
            }
        }
        if let Some(name) = name {
            prompt.name = name;
        }
        if let Some(folder) = edit.folder_id {
            prompt.folder_id = folder;
        }
        Ok(())
    }

    /// Count a use of the prompt and stamp its last-used time.
    pub fn record_use(&mut self, id: &str) -> Result<u32> {
        let prompt = self.prompt_mut(id)?;
        prompt.usage_count = prompt.usage_count.saturating_add(1);
        prompt.last_used = Some(Utc::now());
        Ok(prompt.usage_count)
    }

    pub fn toggle_favorite(&mut self, id: &str) -> Result<bool> {
        let prompt = self.prompt_mut(id)?;
        prompt.favorite = !prompt.favorite;
        Ok(prompt.favorite)
    }

    /// Cast the user's vote. Voting the same way twice withdraws the vote.
    pub fn rate(&mut self, id: &str, vote: Vote) -> Result<Rating> {
        let rating = &mut self.prompt_mut(id)?.rating;
        match rating.user_rating {
            Some(Vote::Up) => rating.up = rating.up.saturating_sub(1),
            Some(Vote::Down) => rating.down = rating.down.saturating_sub(1),
            None => {}
        }
        if rating.user_rating == Some(vote) {
            rating.user_rating = None;
        } else {
            match vote {
                Vote::Up => rating.up = rating.up.saturating_add(1),
                Vote::Down => rating.down = rating.down.saturating_add(1),
            }
            rating.user_rating = Some(vote);
        }
        Ok(*rating)
    }

    pub fn duplicate(&mut self, id: &str) -> Result<String> {
        let original = self.prompt(id)?;
        let copy = Prompt {
            id: new_prompt_id(),
            name: format!("{} (Copy)", original.name),
            usage_count: 0,
            last_used: None,
            created_at: Utc::now(),
            modified_at: None,
            history: Vec::new(),
            rating: Rating::default(),
            ..original.clone()
        };
        let new_id = copy.id.clone();
        self.prompts.push(copy);
        Ok(new_id)
    }

    /// Move a prompt to the trash.
    pub fn delete_prompt(&mut self, id: &str) -> Result<()> {
        let index = self
            .prompts
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| Error::not_found("prompt", id))?;
        let prompt = self.prompts.remove(index);
        self.trash.push(TrashedPrompt {
            prompt,
            deleted_at: Utc::now(),
        });
        info!(prompt = %id, "moved prompt to trash");
        Ok(())
    }

    /// Bring a trashed prompt back. If its folder is gone it lands in the
    /// default folder.
    pub fn restore(&mut self, trash_index: usize) -> Result<String> {
        if trash_index >= self.trash.len() {
            return Err(Error::not_found("trash entry", trash_index.to_string()));
        }
        let mut prompt = self.trash.remove(trash_index).prompt;
        if self.folder(&prompt.folder_id).is_err() {
            prompt.folder_id = self.ensure_default_folder();
        }
        let id = prompt.id.clone();
        self.prompts.push(prompt);
        Ok(id)
    }

    /// Permanently delete a trashed prompt.
    pub fn purge(&mut self, trash_index: usize) -> Result<Prompt> {
        if trash_index >= self.trash.len() {
            return Err(Error::not_found("trash entry", trash_index.to_string()));
        }
        Ok(self.trash.remove(trash_index).prompt)
    }

    pub fn bulk_move(&mut self, ids: &[&str], folder_id: &str) -> Result<usize> {
        self.folder(folder_id)?;
        let wanted: HashSet<&str> = ids.iter().copied().collect();
        let mut moved = 0;
        for prompt in self
            .prompts
            .iter_mut()
            .filter(|p| wanted.contains(p.id.as_str()))
        {
            prompt.folder_id = folder_id.to_string();
            moved += 1;
        }
        Ok(moved)
    }

    /// Trash every listed prompt; unknown ids are ignored.
    pub fn bulk_delete(&mut self, ids: &[&str]) -> usize {
        let wanted: HashSet<&str> = ids.iter().copied().collect();
        let now = Utc::now();
        let (gone, kept): (Vec<Prompt>, Vec<Prompt>) = std::mem::take(&mut self.prompts)
            .into_iter()
            .partition(|p| wanted.contains(p.id.as_str()));
        self.prompts = kept;
        let count = gone.len();
        self.trash.extend(gone.into_iter().map(|prompt| TrashedPrompt {
            prompt,
            deleted_at: now,
        }));
        count
    }

    // -- queries -----------------------------------------------------------

    /// Case-insensitive substring search over names and texts, optionally
    /// limited to one folder. An empty query matches everything.
    pub fn search(&self, query: &str, folder_id: Option<&str>) -> Vec<&Prompt> {
        let query = query.trim().to_lowercase();
        self.prompts
            .iter()
            .filter(|p| folder_id.map_or(true, |f| p.folder_id == f))
            .filter(|p| {
                query.is_empty()
                    || p.name.to_lowercase().contains(&query)
                    || p.text.to_lowercase().contains(&query)
            })
            .collect()
    }

    pub fn recently_used(&self, limit: usize) -> Vec<&Prompt> {
        let mut used: Vec<&Prompt> = self.prompts.iter().filter(|p| p.last_used.is_some()).collect();
        used.sort_by(|a, b| b.last_used.cmp(&a.last_used));
        used.truncate(limit);
        used
    }

    pub fn favorites(&self) -> Vec<&Prompt> {
        self.prompts.iter().filter(|p| p.favorite).collect()
    }

    pub fn top_used(&self, limit: usize) -> Vec<&Prompt> {
        let mut used: Vec<&Prompt> = self.prompts.iter().filter(|p| p.usage_count > 0).collect();
        used.sort_by(|a, b| b.usage_count.cmp(&a.usage_count));
        used.truncate(limit);
        used
    }

    pub fn total_usage(&self) -> u64 {
        self.prompts.iter().map(|p| u64::from(p.usage_count)).sum()
    }

    // -- versions ----------------------------------------------------------

    /// History entries numbered from 1, followed by the current text.
    pub fn versions(&self, id: &str) -> Result<Vec<Version>> {
        let prompt = self.prompt(id)?;
        let mut versions: Vec<Version> = prompt
            .history
            .iter()
            .enumerate()
            .map(|(i, entry)| Version {
                version: i + 1,
                text: entry.text.clone(),
                timestamp: entry.timestamp,
                current: false,
            })
            .collect();
        versions.push(Version {
            version: prompt.version(),
            text: prompt.text.clone(),
            timestamp: prompt.modified_at.unwrap_or(prompt.created_at),
            current: true,
        });
        Ok(versions)
    }

    /// Restore the text of an earlier version. The current text is kept as
    /// a new history entry, so the version count goes up by one.
    pub fn revert(&mut self, id: &str, version: usize) -> Result<()> {
        let prompt = self.prompt_mut(id)?;
        if version == 0 || version > prompt.history.len() {
            return Err(Error::invalid(
                "version",
                format!("{version} is not a previous version"),
            ));
        }
        let text = prompt.history[version - 1].text.clone();
        let now = Utc::now();
        prompt.snapshot(now);
        prompt.text = text;
        prompt.modified_at = Some(now);
        Ok(())
    }

    // -- share codes -------------------------------------------------------

    pub fn export_share_code(&self) -> Result<String> {
        let bundle = OutgoingBundle {
            export_date: Utc::now(),
            version: SHARE_FORMAT_VERSION,
            prompt_count: self.prompts.len(),
            folder_count: self.folders.len(),
            folders: &self.folders,
            prompts: &self.prompts,
        };
        Ok(BASE64.encode(serde_json::to_vec(&bundle)?))
    }

    /// Import prompts from a share code.
    ///
    /// Imported folders get fresh ids; the sender's default folder maps onto
    /// ours. Prompts without a name or text are dropped and any other missing
    /// field takes its default.
    pub fn import_share_code(&mut self, code: &str, mode: ImportMode) -> Result<ImportSummary> {
        let raw = BASE64
            .decode(code.trim())
            .map_err(|e| Error::ShareCode(e.to_string()))?;
        let bundle: IncomingBundle =
            serde_json::from_slice(&raw).map_err(|e| Error::ShareCode(e.to_string()))?;

        let default_id = self.ensure_default_folder();

        // Folder names stay unique ignoring case: an incoming folder whose
        // name is already present reuses that folder.
        let mut by_name: HashMap<String, String> = self
            .folders
            .iter()
            .filter(|f| mode == ImportMode::Merge || f.is_default)
            .map(|f| (f.name.to_lowercase(), f.id.clone()))
            .collect();
        let mut id_map: HashMap<&str, String> = HashMap::new();
        let mut created: Vec<&IncomingFolder> = Vec::new();
        for folder in &bundle.folders {
            let mapped = if folder.is_default {
                default_id.clone()
            } else if let Some(existing) = by_name.get(&folder.name.to_lowercase()) {
                existing.clone()
            } else {
                let id = new_folder_id();
                by_name.insert(folder.name.to_lowercase(), id.clone());
                created.push(folder);
                id
            };
            id_map.insert(folder.id.as_str(), mapped);
        }

        let new_folders: Vec<Folder> = created
            .into_iter()
            .map(|f| {
                let id = id_map[f.id.as_str()].clone();
                let parent_id = f
                    .parent_id
                    .as_deref()
                    .and_then(|p| id_map.get(p))
                    .filter(|p| **p != id)
                    .cloned();
                Folder {
                    id,
                    name: f.name.clone(),
                    is_default: false,
                    parent_id,
                    expanded: false,
                }
            })
            .collect();

        let taken: HashSet<String> = match mode {
            ImportMode::Merge => self.prompts.iter().map(|p| p.id.clone()).collect(),
            ImportMode::Replace => HashSet::new(),
        };
        let base = Utc::now();
        let mut seen = HashSet::new();
        let prompts: Vec<Prompt> = bundle
            .prompts
            .into_iter()
            .filter(|p| {
                p.name.as_deref().is_some_and(|n| !n.is_empty())
                    && p.text.as_deref().is_some_and(|t| !t.is_empty())
            })
            .enumerate()
            .map(|(i, p)| {
                let id = p
                    .id
                    .filter(|id| !taken.contains(id) && !seen.contains(id))
                    .unwrap_or_else(new_prompt_id);
                seen.insert(id.clone());
                let name = p.name.unwrap_or_default();
                let created_at = p
                    .created_at
                    .and_then(Stamp::into_utc)
                    .unwrap_or(base + chrono::Duration::milliseconds(i as i64));
                let history = p
                    .history
                    .unwrap_or_default()
                    .into_iter()
                    .map(|h| HistoryEntry {
                        text: h.text,
                        name: h.name.unwrap_or_else(|| name.clone()),
                        timestamp: h.timestamp.and_then(Stamp::into_utc).unwrap_or(created_at),
                    })
                    .collect();
                Prompt {
                    id,
                    name,
                    text: p.text.unwrap_or_default(),
                    favorite: p.favorite.unwrap_or(false),
                    usage_count: p.usage_count.unwrap_or(0),
                    last_used: p.last_used.and_then(Stamp::into_utc),
                    created_at,
                    modified_at: None,
                    history,
                    folder_id: p
                        .folder_id
                        .as_deref()
                        .and_then(|f| id_map.get(f))
                        .cloned()
                        .unwrap_or_else(|| default_id.clone()),
                    source_url: p.source_url,
                    rating: Rating::default(),
                }
            })
            .collect();

        let summary = ImportSummary {
            prompts: prompts.len(),
            folders: new_folders.len(),
        };
        match mode {
            ImportMode::Merge => {
                self.prompts.extend(prompts);
                self.folders.extend(new_folders);
            }
            ImportMode::Replace => {
                self.folders.retain(|f| f.is_default);
                self.folders.extend(new_folders);
                self.prompts = prompts;
            }
        }
        info!(
            prompts = summary.prompts,
            folders = summary.folders,
            ?mode,
            "imported share code"
        );
        Ok(summary)
    }
}

// ---------------------------------------------------------------------------
// Template variables
// ---------------------------------------------------------------------------

/// Names of `{{variable}}` placeholders, unique, in order of first use.
pub fn extract_variables(text: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for caps in VARIABLE.captures_iter(text) {
        let name = &caps[1];
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Substitute placeholders. Names without a value stay as written.
pub fn fill_variables(text: &str, values: &HashMap<String, String>) -> String {
    VARIABLE
        .replace_all(text, |caps: &Captures| match values.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_prompt(text: &str) -> (PromptLibrary, String) {
        let mut lib = PromptLibrary::new();
        let id = lib
            .add_prompt(NewPrompt {
                name: "Greeting".into(),
                text: text.into(),
                ..NewPrompt::default()
            })
            .unwrap();
        (lib, id)
    }

    fn default_count(lib: &PromptLibrary) -> usize {
        lib.folders().iter().filter(|f| f.is_default).count()
    }

    #[test]
    fn new_library_has_one_default_folder() {
        let lib = PromptLibrary::new();
        assert_eq!(lib.folders().len(), 1);
        assert_eq!(lib.folders()[0].id, DEFAULT_FOLDER_ID);
        assert_eq!(lib.folders()[0].name, DEFAULT_FOLDER_NAME);
    }

    #[test]
    fn heals_missing_and_duplicate_defaults() {
        let folder = |id: &str, is_default| Folder {
            id: id.into(),
            name: id.into(),
            is_default,
            parent_id: None,
            expanded: false,
        };
        let lib = PromptLibrary::from_parts(vec![], vec![folder("work", false)], vec![]);
        assert_eq!(default_count(&lib), 1);
        assert_eq!(lib.folders().len(), 2);

        let lib = PromptLibrary::from_parts(
            vec![],
            vec![folder("a", true), folder("b", true)],
            vec![],
        );
        assert_eq!(default_count(&lib), 1);
        assert!(lib.folder("a").unwrap().is_default);
    }

    #[test]
    fn add_prompt_validates_input() {
        let mut lib = PromptLibrary::new();
        let err = lib
            .add_prompt(NewPrompt {
                name: "  ".into(),
                text: "x".into(),
                ..NewPrompt::default()
            })
            .unwrap_err();
        assert!(matches!(err, Error::Validation { field: "name", .. }));

        let err = lib
            .add_prompt(NewPrompt {
                name: "n".into(),
                text: "x".into(),
                folder_id: Some("nope".into()),
                ..NewPrompt::default()
            })
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { kind: "folder", .. }));
    }

    #[test]
    fn folder_names_are_unique_ignoring_case() {
        let mut lib = PromptLibrary::new();
        lib.add_folder("Work", None).unwrap();
        assert!(lib.add_folder("work", None).is_err());
        assert!(lib.add_folder("", None).is_err());
        assert!(lib.add_folder("Sub", Some("missing")).is_err());
    }

    #[test]
    fn deleting_a_folder_rehomes_prompts_and_children() {
        let mut lib = PromptLibrary::new();
        let work = lib.add_folder("Work", None).unwrap();
        let sub = lib.add_folder("Sub", Some(&work)).unwrap();
        let id = lib
            .add_prompt(NewPrompt {
                name: "n".into(),
                text: "t".into(),
                folder_id: Some(work.clone()),
                ..NewPrompt::default()
            })
            .unwrap();

        lib.delete_folder(&work).unwrap();
        assert_eq!(lib.prompt(&id).unwrap().folder_id, DEFAULT_FOLDER_ID);
        assert_eq!(lib.folder(&sub).unwrap().parent_id, None);
        assert_eq!(default_count(&lib), 1);
    }

    #[test]
    fn default_folder_cannot_be_deleted() {
        let mut lib = PromptLibrary::new();
        let err = lib.delete_folder(DEFAULT_FOLDER_ID).unwrap_err();
        assert!(matches!(err, Error::DefaultFolder(_)));
        assert_eq!(default_count(&lib), 1);
    }

    #[test]
    fn editing_text_records_history() {
        let (mut lib, id) = with_prompt("Hello");
        lib.edit_prompt(
            &id,
            PromptEdit {
                name: Some("Renamed".into()),
                ..PromptEdit::default()
            },
        )
        .unwrap();
        assert_eq!(lib.prompt(&id).unwrap().version(), 1);

        lib.edit_prompt(
            &id,
            PromptEdit {
                text: Some("Hello there".into()),
                ..PromptEdit::default()
            },
        )
        .unwrap();
        let prompt = lib.prompt(&id).unwrap();
        assert_eq!(prompt.version(), 2);
        assert_eq!(prompt.history[0].text, "Hello");
        assert_eq!(prompt.history[0].name, "Renamed");
    }

    #[test]
    fn revert_adds_a_version() {
        let (mut lib, id) = with_prompt("v1");
        for text in ["v2", "v3"] {
            lib.edit_prompt(
                &id,
                PromptEdit {
                    text: Some(text.into()),
                    ..PromptEdit::default()
                },
            )
            .unwrap();
        }
        assert_eq!(lib.versions(&id).unwrap().len(), 3);

        lib.revert(&id, 1).unwrap();
        let versions = lib.versions(&id).unwrap();
        assert_eq!(versions.len(), 4);
        assert_eq!(versions[3].text, "v1");
        assert!(versions[3].current);
        assert_eq!(versions[2].text, "v3");
        assert!(lib.revert(&id, 0).is_err());
        assert!(lib.revert(&id, 4).is_err());
    }

    #[test]
    fn usage_favorites_and_ratings() {
        let (mut lib, id) = with_prompt("Hello");
        assert_eq!(lib.record_use(&id).unwrap(), 1);
        assert_eq!(lib.record_use(&id).unwrap(), 2);
        assert_eq!(lib.total_usage(), 2);
        assert_eq!(lib.recently_used(5).len(), 1);
        assert_eq!(lib.top_used(5)[0].id, id);

        assert!(lib.toggle_favorite(&id).unwrap());
        assert_eq!(lib.favorites().len(), 1);

        let r = lib.rate(&id, Vote::Up).unwrap();
        assert_eq!((r.up, r.down, r.user_rating), (1, 0, Some(Vote::Up)));
        let r = lib.rate(&id, Vote::Down).unwrap();
        assert_eq!((r.up, r.down, r.user_rating), (0, 1, Some(Vote::Down)));
        let r = lib.rate(&id, Vote::Down).unwrap();
        assert_eq!((r.up, r.down, r.user_rating), (0, 0, None));
    }

    #[test]
    fn duplicate_resets_stats() {
        let (mut lib, id) = with_prompt("Hello");
        lib.record_use(&id).unwrap();
        let copy = lib.duplicate(&id).unwrap();
        let copy = lib.prompt(&copy).unwrap();
        assert_eq!(copy.name, "Greeting (Copy)");
        assert_eq!(copy.usage_count, 0);
        assert!(copy.last_used.is_none());
    }

    #[test]
    fn trash_round_trip() {
        let (mut lib, id) = with_prompt("Hello");
        lib.delete_prompt(&id).unwrap();
        assert!(lib.prompts().is_empty());
        assert_eq!(lib.trash().len(), 1);

        assert_eq!(lib.restore(0).unwrap(), id);
        assert!(lib.trash().is_empty());
        assert!(lib.restore(0).is_err());

        lib.delete_prompt(&id).unwrap();
        assert_eq!(lib.purge(0).unwrap().id, id);
        assert!(lib.trash().is_empty());
    }

    #[test]
    fn bulk_operations() {
        let mut lib = PromptLibrary::new();
        let work = lib.add_folder("Work", None).unwrap();
        let ids: Vec<String> = (0..3)
            .map(|i| {
                lib.add_prompt(NewPrompt {
                    name: format!("p{i}"),
                    text: "text".into(),
                    ..NewPrompt::default()
                })
                .unwrap()
            })
            .collect();
        let refs: Vec<&str> = ids.iter().map(String::as_str).collect();

        assert_eq!(lib.bulk_move(&refs[..2], &work).unwrap(), 2);
        assert_eq!(lib.search("", Some(&work)).len(), 2);
        assert!(lib.bulk_move(&refs, "missing").is_err());

        assert_eq!(lib.bulk_delete(&[refs[0], "unknown"]), 1);
        assert_eq!(lib.prompts().len(), 2);
        assert_eq!(lib.trash().len(), 1);
    }

    #[test]
    fn search_matches_name_or_text() {
        let (lib, _) = with_prompt("Say hello to {{name}}");
        assert_eq!(lib.search("GREET", None).len(), 1);
        assert_eq!(lib.search("hello", None).len(), 1);
        assert!(lib.search("farewell", None).is_empty());
    }

    #[test]
    fn variables() {
        let text = "Dear {{name}}, re {{topic}}. Thanks {{name}}.";
        assert_eq!(extract_variables(text), vec!["name", "topic"]);

        let mut values = HashMap::new();
        values.insert("name".to_string(), "Ada".to_string());
        assert_eq!(
            fill_variables(text, &values),
            "Dear Ada, re {{topic}}. Thanks Ada."
        );
    }

    #[test]
    fn share_code_replace_preserves_prompts() {
        let mut source = PromptLibrary::new();
        let work = source.add_folder("Work", None).unwrap();
        source
            .add_prompt(NewPrompt {
                name: "Standup".into(),
                text: "Summarize yesterday".into(),
                folder_id: Some(work),
                ..NewPrompt::default()
            })
            .unwrap();
        source
            .add_prompt(NewPrompt {
                name: "Loose".into(),
                text: "No folder".into(),
                ..NewPrompt::default()
            })
            .unwrap();
        let code = source.export_share_code().unwrap();

        let (mut target, _) = with_prompt("will be replaced");
        let summary = target.import_share_code(&code, ImportMode::Replace).unwrap();
        assert_eq!(summary, ImportSummary { prompts: 2, folders: 1 });

        let names: Vec<_> = target.prompts().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Standup", "Loose"]);
        assert_eq!(target.prompts()[1].folder_id, DEFAULT_FOLDER_ID);

        let work_copy = target.folders().iter().find(|f| f.name == "Work").unwrap();
        assert_ne!(work_copy.id, source.folders()[1].id);
        assert_eq!(target.prompts()[0].folder_id, work_copy.id);
        assert_eq!(default_count(&target), 1);
    }

    #[test]
    fn share_code_merge_normalises_sparse_prompts() {
        let payload = r#"{"prompts":[{"name":"a","text":"b"},{"name":"","text":"x"},{"text":"y"}]}"#;
        let code = BASE64.encode(payload);

        let (mut lib, _) = with_prompt("existing");
        let summary = lib.import_share_code(&code, ImportMode::Merge).unwrap();
        assert_eq!(summary.prompts, 1);
        assert_eq!(lib.prompts().len(), 2);
        let imported = &lib.prompts()[1];
        assert_eq!(imported.folder_id, DEFAULT_FOLDER_ID);
        assert_eq!(imported.usage_count, 0);
        assert!(imported.history.is_empty());
    }

    #[test]
    fn merge_assigns_fresh_ids_on_collision() {
        let (mut lib, id) = with_prompt("Hello");
        let code = lib.export_share_code().unwrap();
        lib.import_share_code(&code, ImportMode::Merge).unwrap();
        assert_eq!(lib.prompts().len(), 2);
        assert_ne!(lib.prompts()[1].id, id);
    }

    #[test]
    fn browser_share_codes_keep_folders_and_stats() {
        let payload = r#"{
            "exportDate": "2024-05-01T10:00:00.000Z",
            "version": "2.0",
            "folders": [
                {"id": "default", "name": "Uncategorized", "isDefault": true},
                {"id": "f1", "name": "Writing", "isDefault": false, "parentId": null}
            ],
            "prompts": [{
                "id": "p1",
                "name": "Blog intro",
                "text": "Write an intro about {{topic}}",
                "folderId": "f1",
                "usageCount": 7,
                "lastUsed": 1714557600000,
                "createdAt": 1714550400000,
                "history": [{"text": "Write an intro", "timestamp": 1714554000000}]
            }]
        }"#;
        let mut lib = PromptLibrary::new();
        let summary = lib
            .import_share_code(&BASE64.encode(payload), ImportMode::Replace)
            .unwrap();
        assert_eq!(summary, ImportSummary { prompts: 1, folders: 1 });
        assert_eq!(default_count(&lib), 1);

        let prompt = &lib.prompts()[0];
        let writing = lib.folders().iter().find(|f| f.name == "Writing").unwrap();
        assert_eq!(prompt.folder_id, writing.id);
        assert_eq!(prompt.usage_count, 7);
        assert_eq!(prompt.created_at.timestamp_millis(), 1_714_550_400_000);
        assert!(prompt.last_used.is_some());
        assert_eq!(prompt.history[0].name, "Blog intro");
        assert_eq!(prompt.version(), 2);
    }

    #[test]
    fn merge_reuses_folders_with_the_same_name() {
        let mut source = PromptLibrary::new();
        let work = source.add_folder("Work", None).unwrap();
        source
            .add_prompt(NewPrompt {
                name: "Standup".into(),
                text: "Summarize yesterday".into(),
                folder_id: Some(work),
                ..NewPrompt::default()
            })
            .unwrap();
        let code = source.export_share_code().unwrap();

        let mut target = PromptLibrary::new();
        let existing = target.add_folder("WORK", None).unwrap();
        let summary = target.import_share_code(&code, ImportMode::Merge).unwrap();
        assert_eq!(summary.folders, 0);
        assert_eq!(target.folders().len(), 2);
        assert_eq!(target.prompts()[0].folder_id, existing);
        assert!(target.add_folder("work", None).is_err());
    }

    #[test]
    fn counters_saturate() {
        let (mut lib, id) = with_prompt("Hello");
        lib.prompt_mut(&id).unwrap().usage_count = u32::MAX;
        assert_eq!(lib.record_use(&id).unwrap(), u32::MAX);

        lib.prompt_mut(&id).unwrap().rating.up = u32::MAX;
        assert_eq!(lib.rate(&id, Vote::Up).unwrap().up, u32::MAX);
    }

    #[test]
    fn bad_share_codes_are_rejected() {
        let mut lib = PromptLibrary::new();
        assert!(matches!(
            lib.import_share_code("not base64!!", ImportMode::Merge),
            Err(Error::ShareCode(_))
        ));
        let code = BASE64.encode(r#"{"folders":[]}"#);
        assert!(matches!(
            lib.import_share_code(&code, ImportMode::Merge),
            Err(Error::ShareCode(_))
        ));
    }
}
