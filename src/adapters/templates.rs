use crate::domain::model::TemplateVars;
use crate::domain::ports::PayloadTemplates;
use crate::utils::error::{NovaError, Result};
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

static DOLLAR_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap());
static BRACE_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap());

/// 以名稱（不分大小寫）索引的 payload 模板
#[derive(Debug, Clone, Default)]
pub struct TemplateStore {
    templates: HashMap<String, String>,
}

impl TemplateStore {
    /// 載入目錄中每個檔案，以檔名（去掉最後一個副檔名）為鍵
    pub fn from_directory<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let mut templates = HashMap::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let body = std::fs::read_to_string(&path)?;
            templates.insert(stem.to_lowercase(), body);
        }
        tracing::info!("📄 Loaded {} payload templates from {}", templates.len(), dir.display());
        Ok(Self { templates })
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        Self {
            templates: pairs
                .into_iter()
                .map(|(name, body)| (name.as_ref().to_lowercase(), body.into()))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.templates.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl PayloadTemplates for TemplateStore {
    fn render(&self, name: &str, vars: &TemplateVars) -> Result<String> {
        let raw = self
            .templates
            .get(&name.to_lowercase())
            .ok_or_else(|| NovaError::not_found(format!("payload template '{}'", name)))?;
        Ok(substitute(raw, vars))
    }
}

/// `${var}` 形式：未知變數保持原樣；否則只替換已知的 `{var}`
pub fn substitute(raw: &str, vars: &TemplateVars) -> String {
    let pattern = if raw.contains("${") {
        &*DOLLAR_PLACEHOLDER
    } else {
        &*BRACE_PLACEHOLDER
    };
    pattern
        .replace_all(raw, |caps: &Captures| match vars.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}
