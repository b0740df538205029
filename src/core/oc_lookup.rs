use crate::config::toml_config::OpenConfigSettings;
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::LazyLock;

pub const PLATFORM_MODULE: &str = "openconfig-platform";

static REVISION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"revision\s+"(\d{4}-\d{2}-\d{2})"\s*\{"#).unwrap());
static OC_EXT_VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"oc-ext:openconfig-version\s+"([^"]+)""#).unwrap());
static REFERENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"reference\s+"([^"]+)""#).unwrap());
static SEMVER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\d+\.\d+\.\d+\b").unwrap());

/// OpenConfig 發行版查表：revision → version，以及 version → release tag
#[derive(Debug, Clone, Default)]
pub struct OpenConfigLookup {
    revisions: HashMap<String, HashMap<String, String>>,
    version_tags: HashMap<String, String>,
}

impl OpenConfigLookup {
    /// 掃描參考 schema repository 的 tag；沒有 tag 時退回目前 checkout 的檔案
    pub fn build(settings: &OpenConfigSettings) -> Self {
        let repo = PathBuf::from(&settings.repository);
        let mut lookup = Self::default();

        if !repo.exists() {
            tracing::warn!("🔶 OpenConfig repository not found at {}", repo.display());
            return lookup;
        }

        if !lookup.build_from_tags(&repo, settings) {
            lookup.build_from_checkout(&repo.join(&settings.platform_file));
        }

        tracing::debug!(
            "📚 OpenConfig lookup ready: {} revisions, {} tagged versions",
            lookup.revisions.get(PLATFORM_MODULE).map_or(0, |m| m.len()),
            lookup.version_tags.len()
        );
        lookup
    }

    /// 由 `(tag, 檔案內容)` 建立；依 tag 順序，同一 version 以第一個 tag 為準
    pub fn from_tagged_sources<'a, I>(sources: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut lookup = Self::default();
        for (tag, text) in sources {
            lookup.record_tag(tag, text);
        }
        lookup
    }

    /// 沒有任何 tag 時：檔案中所有 revision 都對應到同一個 version
    pub fn from_checkout_text(text: &str) -> Self {
        let mut lookup = Self::default();
        lookup.record_checkout(text);
        lookup
    }

    pub fn version_by_revision(&self, module: &str, revision: &str) -> Option<&str> {
        self.revisions
            .get(module)
            .and_then(|m| m.get(revision))
            .map(String::as_str)
    }

    pub fn latest_version(&self, module: &str) -> Option<&str> {
        self.revisions
            .get(module)
            .and_then(|m| m.iter().max_by(|a, b| a.0.cmp(b.0)))
            .map(|(_, version)| version.as_str())
    }

    pub fn tag_for_version(&self, version: &str) -> Option<&str> {
        self.version_tags.get(version).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.revisions.values().all(|m| m.is_empty())
    }

    fn build_from_tags(&mut self, repo: &Path, settings: &OpenConfigSettings) -> bool {
        if settings.fetch_tags {
            if let Err(e) = Command::new("git")
                .args(["fetch", "--tags"])
                .current_dir(repo)
                .output()
            {
                tracing::warn!("🔶 git fetch --tags failed: {}", e);
            }
        }

        let output = match Command::new("git")
            .args(["tag", "-l", "v*.*.*", "--sort=v:refname"])
            .current_dir(repo)
            .output()
        {
            Ok(out) if out.status.success() => out,
            Ok(out) => {
                tracing::warn!(
                    "🔶 git tag failed: {}",
                    String::from_utf8_lossy(&out.stderr).trim()
                );
                return false;
            }
            Err(e) => {
                tracing::warn!("🔶 git not available: {}", e);
                return false;
            }
        };

        let listing = String::from_utf8_lossy(&output.stdout).into_owned();
        let tags: Vec<&str> = listing.lines().map(str::trim).filter(|t| !t.is_empty()).collect();
        if tags.is_empty() {
            tracing::warn!("🔶 No release tags found in {}", repo.display());
            return false;
        }

        for tag in tags {
            let object = format!("{}:{}", tag, settings.platform_file);
            let shown = Command::new("git")
                .args(["show", &object])
                .current_dir(repo)
                .output();
            match shown {
                Ok(out) if out.status.success() => {
                    self.record_tag(tag, &String::from_utf8_lossy(&out.stdout));
                }
                // 舊的 tag 可能沒有這個檔案
                _ => continue,
            }
        }

        !self.is_empty()
    }

    fn build_from_checkout(&mut self, path: &Path) {
        match std::fs::read_to_string(path) {
            Ok(text) => self.record_checkout(&text),
            Err(e) => tracing::warn!("🔶 Fallback schema {} unreadable: {}", path.display(), e),
        }
    }

    fn record_tag(&mut self, tag: &str, text: &str) {
        let (Some(version), Some(revision)) = (extract_version(text), extract_top_revision(text))
        else {
            return;
        };
        self.revisions
            .entry(PLATFORM_MODULE.to_string())
            .or_default()
            .insert(revision, version.clone());
        self.version_tags.entry(version).or_insert_with(|| tag.to_string());
    }

    fn record_checkout(&mut self, text: &str) {
        let Some(version) = extract_version(text) else {
            tracing::warn!("🔶 No version marker in checked-out platform schema");
            return;
        };
        let map = self.revisions.entry(PLATFORM_MODULE.to_string()).or_default();
        for caps in REVISION_RE.captures_iter(text) {
            map.insert(caps[1].to_string(), version.clone());
        }
    }
}

pub fn extract_oc_ext_version(text: &str) -> Option<String> {
    OC_EXT_VERSION_RE.captures(text).map(|caps| caps[1].to_string())
}

/// `oc-ext:openconfig-version "X"`，否則取第一個 reference 中的 X.Y.Z
pub fn extract_version(text: &str) -> Option<String> {
    if let Some(version) = extract_oc_ext_version(text) {
        return Some(version);
    }
    let reference = REFERENCE_RE.captures(text)?;
    let inner = &reference[1];
    Some(
        SEMVER_RE
            .find(inner)
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| inner.to_string()),
    )
}

pub fn extract_top_revision(text: &str) -> Option<String> {
    REVISION_RE.captures(text).map(|caps| caps[1].to_string())
}
