use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::TaggerError;

/// Tag category as numbered in the label CSV.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TagCategory {
    General = 0,
    Artist = 1,
    Rating = 2,
    Copyright = 3,
    Character = 4,
    Meta = 5,
}

impl TagCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            TagCategory::General => "general",
            TagCategory::Artist => "artist",
            TagCategory::Rating => "rating",
            TagCategory::Copyright => "copyright",
            TagCategory::Character => "character",
            TagCategory::Meta => "meta",
        }
    }
}

impl FromStr for TagCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "0" | "general" => Ok(TagCategory::General),
            "1" | "artist" => Ok(TagCategory::Artist),
            "2" | "rating" => Ok(TagCategory::Rating),
            "3" | "copyright" => Ok(TagCategory::Copyright),
            "4" | "character" => Ok(TagCategory::Character),
            "5" | "meta" => Ok(TagCategory::Meta),
            other => Err(format!("unknown tag category {:?}", other)),
        }
    }
}

impl fmt::Display for TagCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the label CSV.
#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    name: String,
    category: Option<TagCategory>,
    count: Option<i64>,
    ips: Vec<String>,
}

impl Tag {
    pub fn new(name: &str, category: Option<TagCategory>, count: Option<i64>, ips: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            category,
            count,
            ips,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `None` when the CSV carries a category this crate does not know.
    pub fn category(&self) -> Option<TagCategory> {
        self.category
    }

    pub fn count(&self) -> Option<i64> {
        self.count
    }

    /// Series ("intellectual properties") a character tag belongs to.
    pub fn ips(&self) -> &[String] {
        &self.ips
    }
}

/// Column positions, found by header name with a positional fallback.
struct Columns {
    name: usize,
    category: usize,
    count: usize,
    ips: usize,
}

impl Columns {
    fn from_headers(headers: &csv::StringRecord) -> Self {
        let find = |name: &str, fallback: usize| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
                .unwrap_or(fallback)
        };
        Self {
            name: find("name", 2),
            category: find("category", 3),
            count: find("count", 4),
            ips: find("ips", 5),
        }
    }
}

fn parse_ips(raw: &str) -> Vec<String> {
    if raw.trim().is_empty() {
        return Vec::new();
    }
    match serde_json::from_str::<Vec<serde_json::Value>>(raw) {
        Ok(items) => items
            .into_iter()
            .map(|v| match v {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            })
            .collect(),
        Err(_) => Vec::new(),
    }
}

/// The label set of a model. Row `i` describes output `i`.
#[derive(Debug, Clone)]
pub struct LabelTags {
    tags: Vec<Tag>,
    label2idx: HashMap<String, usize>,
}

impl LabelTags {
    pub fn from_tags(tags: Vec<Tag>) -> Self {
        let mut label2idx = HashMap::with_capacity(tags.len());
        for (i, tag) in tags.iter().enumerate() {
            label2idx.entry(tag.name.clone()).or_insert(i);
        }
        Self { tags, label2idx }
    }

    /// Load from the local CSV file
    pub fn load<P: AsRef<Path>>(csv_path: P) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(csv_path.as_ref())
            .with_context(|| format!("Failed to read CSV file at {:?}", csv_path.as_ref()))?;
        let headers = reader.headers()?.clone();
        let columns = Columns::from_headers(&headers);

        let mut tags = Vec::new();
        for (row, record) in reader.records().enumerate() {
            let record = record.with_context(|| format!("Failed to read tag row {}", row + 1))?;
            let name = record.get(columns.name).unwrap_or_default().to_string();
            let category_raw = record.get(columns.category).unwrap_or_default();
            let category = match category_raw.parse::<TagCategory>() {
                Ok(c) => Some(c),
                Err(e) => {
                    tracing::debug!("Tag {:?} (row {}): {}", name, row + 1, e);
                    None
                }
            };
            let count = record
                .get(columns.count)
                .and_then(|c| c.trim().parse::<i64>().ok());
            let ips = record.get(columns.ips).map(parse_ips).unwrap_or_default();

            tags.push(Tag {
                name,
                category,
                count,
                ips,
            });
        }

        tracing::debug!("Loaded {} tags from {:?}", tags.len(), csv_path.as_ref());
        Ok(Self::from_tags(tags))
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Tag> {
        self.tags.get(idx)
    }

    pub fn lookup(&self, name: &str) -> Option<&Tag> {
        self.label2idx.get(name).map(|&i| &self.tags[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tag> {
        self.tags.iter()
    }
}

const DEFAULT_LABEL_FILES: [&str; 3] = [
    "selected_tags.csv",
    "selected_tags_v3.csv",
    "selected_tags_v3c.csv",
];

/// Finds the label CSV for a model directory.
///
/// An explicit path wins when it exists. Otherwise the well-known names are
/// tried in order, then any other `selected_tags*.csv` in name order.
pub fn discover_labels_csv(model_dir: &Path, explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        anyhow::ensure!(path.is_file(), "Tag CSV {:?} does not exist", path);
        return Ok(path.to_path_buf());
    }

    let mut candidates: Vec<PathBuf> = DEFAULT_LABEL_FILES
        .iter()
        .map(|name| model_dir.join(name))
        .collect();

    if let Ok(entries) = std::fs::read_dir(model_dir) {
        let mut extra: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                let name = p.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
                name.starts_with("selected_tags") && name.ends_with(".csv")
            })
            .filter(|p| !candidates.contains(p))
            .collect();
        extra.sort();
        candidates.extend(extra);
    }

    candidates
        .into_iter()
        .find(|p| p.is_file())
        .ok_or_else(|| TaggerError::LabelsNotFound(model_dir.to_path_buf()).into())
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const CSV: &str = "id,tag_id,name,category,count,ips\n\
0,1,1girl,0,100,[]\n\
1,2,hatsune_miku,4,50,\"[\"\"vocaloid\"\"]\"\n\
2,3,weird,99,1,\n\
3,4,general,rating,,\n";

    #[test]
    fn test_load_csv() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("selected_tags.csv");
        fs::write(&path, CSV).unwrap();

        let labels = LabelTags::load(&path).unwrap();
        assert_eq!(labels.len(), 4);

        let miku = labels.lookup("hatsune_miku").unwrap();
        assert_eq!(miku.category(), Some(TagCategory::Character));
        assert_eq!(miku.ips(), ["vocaloid".to_string()]);
        assert_eq!(miku.count(), Some(50));

        // Unknown category keeps its slot so indices stay aligned.
        assert_eq!(labels.get(2).unwrap().name(), "weird");
        assert_eq!(labels.get(2).unwrap().category(), None);

        assert_eq!(labels.get(3).unwrap().category(), Some(TagCategory::Rating));
        assert_eq!(labels.get(3).unwrap().count(), None);
    }

    #[test]
    fn test_category_parse() {
        assert_eq!("4".parse::<TagCategory>().unwrap(), TagCategory::Character);
        assert_eq!("General".parse::<TagCategory>().unwrap(), TagCategory::General);
        assert!("7".parse::<TagCategory>().is_err());
    }

    #[test]
    fn test_discover_labels_csv_order() {
        let dir = tempdir().unwrap();
        assert!(discover_labels_csv(dir.path(), None).is_err());

        fs::write(dir.path().join("selected_tags_zzz.csv"), "").unwrap();
        assert_eq!(
            discover_labels_csv(dir.path(), None).unwrap(),
            dir.path().join("selected_tags_zzz.csv")
        );

        fs::write(dir.path().join("selected_tags_v3.csv"), "").unwrap();
        assert_eq!(
            discover_labels_csv(dir.path(), None).unwrap(),
            dir.path().join("selected_tags_v3.csv")
        );

        fs::write(dir.path().join("selected_tags.csv"), "").unwrap();
        assert_eq!(
            discover_labels_csv(dir.path(), None).unwrap(),
            dir.path().join("selected_tags.csv")
        );
    }

    #[test]
    fn test_discover_labels_csv_explicit() {
        let dir = tempdir().unwrap();
        let custom = dir.path().join("custom.csv");
        assert!(discover_labels_csv(dir.path(), Some(&custom)).is_err());
        fs::write(&custom, "").unwrap();
        assert_eq!(discover_labels_csv(dir.path(), Some(&custom)).unwrap(), custom);
    }
}
