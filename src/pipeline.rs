//! This module provides a high-level `TaggingPipeline` for processing images and generating tags.
//!
//! The pipeline combines a `TaggerModel`, an `ImagePreprocessor` and the model's
//! `LabelTags`. Raw scores are turned into a `TagResult` in three steps:
//!
//! 1. `select_predictions` keeps tags above their category threshold, sorted
//!    by score and capped per category. Rating and other unwritten categories
//!    still take slots under the cap;
//! 2. `apply_solo_rule` trims characters down to one for `solo` images and
//!    collects the series of the remaining characters;
//! 3. `format_tags` produces the final ordered tag list for a sidecar file.

use std::{cmp::Ordering, collections::HashMap};

use anyhow::{Context, Result};
use image::DynamicImage;
use itertools::Itertools;

use crate::{
    config::Settings,
    processor::{ImagePreprocessor, ImageProcessor},
    tag::fix_tag_underscore,
    tagger::{Device, TaggerModel},
    tags::{discover_labels_csv, LabelTags, TagCategory},
};

/// Scores below this are never considered.
pub const MIN_SCORE: f32 = 1e-4;

/// Upper bound on emitted tags when no limits are configured.
pub const DEFAULT_HARD_CAP: usize = 100;

/// Per-category thresholds and count limits.
///
/// Categories without a threshold use the general one. Categories without a
/// limit are only bounded by the overall cap.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagFilter {
    pub thresholds: HashMap<TagCategory, f32>,
    pub limits: HashMap<TagCategory, usize>,
}

impl TagFilter {
    pub fn from_settings(settings: &Settings) -> Self {
        let thresholds = HashMap::from([
            (TagCategory::General, settings.thresholds.general),
            (TagCategory::Character, settings.thresholds.character),
        ]);
        let limits = HashMap::from([
            (TagCategory::General, settings.limits.general),
            (TagCategory::Character, settings.limits.character),
        ]);
        Self { thresholds, limits }
    }

    pub fn threshold(&self, category: TagCategory) -> f32 {
        self.thresholds
            .get(&category)
            .or_else(|| self.thresholds.get(&TagCategory::General))
            .copied()
            .unwrap_or(0.0)
    }

    /// Total number of tags an image may receive.
    pub fn hard_cap(&self) -> usize {
        if self.limits.is_empty() {
            DEFAULT_HARD_CAP
        } else {
            self.limits.values().sum()
        }
    }
}

/// One selected tag with its score.
#[derive(Debug, Clone, PartialEq)]
pub struct TagPrediction {
    pub name: String,
    pub category: TagCategory,
    pub score: f32,
}

/// The tags chosen for one image.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagResult {
    /// Selected tags, highest score first.
    pub tags: Vec<TagPrediction>,
    /// Series of the kept character tags, sorted.
    pub series_tags: Vec<String>,
}

impl TagResult {
    pub fn by_category(&self, category: TagCategory) -> impl Iterator<Item = &TagPrediction> {
        self.tags.iter().filter(move |t| t.category == category)
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.series_tags.is_empty()
    }
}

fn by_score_then_name(a: &TagPrediction, b: &TagPrediction) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.name.cmp(&b.name))
}

/// Picks the tags to emit from one row of model scores.
pub fn select_predictions(
    scores: &[f32],
    labels: &LabelTags,
    filter: &TagFilter,
) -> Vec<TagPrediction> {
    if scores.len() != labels.len() {
        tracing::warn!(
            "Model returned {} scores for {} labels",
            scores.len(),
            labels.len()
        );
    }

    let candidates = scores
        .iter()
        .enumerate()
        .filter(|(_, &score)| score >= MIN_SCORE)
        .filter_map(|(idx, &score)| {
            let tag = labels.get(idx)?;
            let category = tag.category()?;
            let threshold = filter.threshold(category);
            (score >= threshold).then(|| TagPrediction {
                name: tag.name().to_string(),
                category,
                score,
            })
        })
        .sorted_by(by_score_then_name);

    let hard_cap = filter.hard_cap();
    let mut counts: HashMap<TagCategory, usize> = HashMap::new();
    let mut selected = Vec::new();

    for prediction in candidates {
        if selected.len() >= hard_cap {
            break;
        }
        let count = counts.entry(prediction.category).or_insert(0);
        if let Some(&limit) = filter.limits.get(&prediction.category) {
            if *count >= limit {
                continue;
            }
        }
        *count += 1;
        selected.push(prediction);
    }

    selected
}

/// Keeps only the best character on `solo` images and gathers series tags.
pub fn apply_solo_rule(
    tags: Vec<TagPrediction>,
    labels: &LabelTags,
    enabled: bool,
) -> TagResult {
    let is_solo = tags
        .iter()
        .any(|t| t.category == TagCategory::General && t.name.eq_ignore_ascii_case("solo"));

    let tags: Vec<TagPrediction> = if enabled && is_solo {
        let best_character = tags
            .iter()
            .filter(|t| t.category == TagCategory::Character)
            .min_by(|a, b| by_score_then_name(a, b))
            .map(|t| t.name.clone());

        match best_character {
            Some(best) => tags
                .into_iter()
                .filter(|t| t.category != TagCategory::Character || t.name == best)
                .collect(),
            None => tags,
        }
    } else {
        tags
    };

    let series_tags = tags
        .iter()
        .filter(|t| t.category == TagCategory::Character)
        .filter_map(|t| labels.lookup(&t.name))
        .flat_map(|meta| meta.ips().iter().cloned())
        .sorted()
        .dedup()
        .collect();

    TagResult { tags, series_tags }
}

/// Orders a result for writing: characters, then series, then general tags.
///
/// Tags of any other category are left out here.
pub fn format_tags(result: &TagResult, convert_underscore: bool) -> Vec<String> {
    let convert = |name: &str| {
        if convert_underscore {
            fix_tag_underscore(name)
        } else {
            name.to_string()
        }
    };

    let characters = result
        .by_category(TagCategory::Character)
        .sorted_by(|a, b| by_score_then_name(a, b))
        .map(|t| convert(&t.name));
    let series = result.series_tags.iter().map(|s| convert(s));
    let general = result
        .by_category(TagCategory::General)
        .sorted_by(|a, b| by_score_then_name(a, b))
        .map(|t| convert(&t.name));

    characters.chain(series).chain(general).collect()
}

/// Anything that turns an image into a tag list for its sidecar file.
pub trait ImageTagger {
    fn tag_image(&mut self, image: &DynamicImage) -> Result<Vec<String>>;
}

/// An end-to-end pipeline for image tagging.
#[derive(Debug)]
pub struct TaggingPipeline {
    /// The underlying ONNX model for tagging.
    pub model: TaggerModel,
    /// The preprocessor for preparing images.
    pub preprocessor: ImagePreprocessor,
    /// The set of labels the model can predict.
    pub labels: LabelTags,
    pub filter: TagFilter,
    pub solo_character_limit: bool,
    pub convert_underscore: bool,
}

impl TaggingPipeline {
    pub fn new(
        model: TaggerModel,
        preprocessor: ImagePreprocessor,
        labels: LabelTags,
        settings: &Settings,
    ) -> Self {
        Self {
            model,
            preprocessor,
            labels,
            filter: TagFilter::from_settings(settings),
            solo_character_limit: settings.behavior.enable_solo_character_limit,
            convert_underscore: settings.behavior.convert_underscore_to_space,
        }
    }

    /// Builds the pipeline from the model files and device named in `settings`.
    pub fn load(settings: &Settings) -> Result<Self> {
        Self::load_with_devices(settings, &settings.devices()?)
    }

    pub fn load_with_devices(settings: &Settings, devices: &[Device]) -> Result<Self> {
        let model_dir = settings.model_dir();
        let labels_path = discover_labels_csv(&model_dir, None)?;
        let labels = LabelTags::load(&labels_path)?;
        let model = TaggerModel::load(settings.model_path(), devices)
            .context("Failed to initialize the tagger model")?;

        tracing::info!("Tagging pipeline ready with {} labels", labels.len());
        Ok(Self::new(model, ImagePreprocessor::default(), labels, settings))
    }

    /// Predicts tags for a single image.
    pub fn predict(&mut self, image: &DynamicImage) -> Result<TagResult> {
        let mut results = self.predict_batch(vec![image])?;
        results
            .pop()
            .context("Prediction batch returned no results for a single image")
    }

    /// Predicts tags for a batch of images.
    pub fn predict_batch(&mut self, images: Vec<&DynamicImage>) -> Result<Vec<TagResult>> {
        let tensor = self.preprocessor.process_batch(images)?;
        let probs = self.model.predict(tensor)?;

        let results = probs
            .iter()
            .map(|scores| {
                let selected = select_predictions(scores, &self.labels, &self.filter);
                apply_solo_rule(selected, &self.labels, self.solo_character_limit)
            })
            .collect();

        Ok(results)
    }
}

impl ImageTagger for TaggingPipeline {
    fn tag_image(&mut self, image: &DynamicImage) -> Result<Vec<String>> {
        let result = self.predict(image)?;
        Ok(format_tags(&result, self.convert_underscore))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tags::Tag;

    fn labels() -> LabelTags {
        LabelTags::from_tags(vec![
            Tag::new("1girl", Some(TagCategory::General), None, vec![]),
            Tag::new("solo", Some(TagCategory::General), None, vec![]),
            Tag::new("long_hair", Some(TagCategory::General), None, vec![]),
            Tag::new("hatsune_miku", Some(TagCategory::Character), None, vec!["vocaloid".into()]),
            Tag::new("kagamine_rin", Some(TagCategory::Character), None, vec!["vocaloid".into(), "project_diva".into()]),
            Tag::new("safe", Some(TagCategory::Rating), None, vec![]),
            Tag::new("^_^", Some(TagCategory::General), None, vec![]),
            Tag::new("mystery", None, None, vec![]),
        ])
    }

    fn filter(general: usize, character: usize) -> TagFilter {
        TagFilter {
            thresholds: HashMap::from([(TagCategory::General, 0.4), (TagCategory::Character, 0.6)]),
            limits: HashMap::from([(TagCategory::General, general), (TagCategory::Character, character)]),
        }
    }

    fn names(tags: &[TagPrediction]) -> Vec<&str> {
        tags.iter().map(|t| t.name.as_str()).collect()
    }

    #[test]
    fn test_select_thresholds_and_order() {
        let scores = [0.9, 0.5, 0.5, 0.7, 0.55, 0.99, 0.3, 0.99];
        let selected = select_predictions(&scores, &labels(), &filter(10, 10));
        // rating uses the general threshold, unknown category is dropped, ties break by name
        assert_eq!(
            names(&selected),
            vec!["safe", "1girl", "hatsune_miku", "long_hair", "solo"]
        );
    }

    #[test]
    fn test_rating_tags_count_against_the_cap() {
        let labels = LabelTags::from_tags(vec![
            Tag::new("a", Some(TagCategory::General), None, vec![]),
            Tag::new("b", Some(TagCategory::General), None, vec![]),
            Tag::new("c", Some(TagCategory::General), None, vec![]),
            Tag::new("sensitive", Some(TagCategory::Rating), None, vec![]),
        ]);
        let selected = select_predictions(&[0.9, 0.8, 0.7, 0.95], &labels, &filter(3, 0));
        assert_eq!(names(&selected), vec!["sensitive", "a", "b"]);

        let result = apply_solo_rule(selected, &labels, true);
        assert_eq!(format_tags(&result, true), vec!["a", "b"]);
    }

    #[test]
    fn test_threshold_falls_back_to_general() {
        let f = filter(10, 10);
        assert_eq!(f.threshold(TagCategory::Character), 0.6);
        assert_eq!(f.threshold(TagCategory::Meta), 0.4);
        assert_eq!(TagFilter::default().threshold(TagCategory::Rating), 0.0);
    }

    #[test]
    fn test_select_limits() {
        let scores = [0.9, 0.8, 0.7, 0.95, 0.9, 0.0, 0.0, 0.0];
        let selected = select_predictions(&scores, &labels(), &filter(2, 1));
        assert_eq!(names(&selected), vec!["hatsune_miku", "1girl", "solo"]);
    }

    #[test]
    fn test_select_skips_tiny_scores() {
        let mut f = filter(10, 10);
        f.thresholds.insert(TagCategory::General, 0.0);
        let scores = [0.00005, 0.2, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        assert_eq!(names(&select_predictions(&scores, &labels(), &f)), vec!["solo"]);
    }

    #[test]
    fn test_hard_cap_default() {
        assert_eq!(TagFilter::default().hard_cap(), DEFAULT_HARD_CAP);
        assert_eq!(filter(55, 1).hard_cap(), 56);
    }

    #[test]
    fn test_solo_rule_keeps_best_character() {
        let scores = [0.9, 0.8, 0.0, 0.7, 0.95, 0.0, 0.0, 0.0];
        let selected = select_predictions(&scores, &labels(), &filter(10, 10));

        let result = apply_solo_rule(selected.clone(), &labels(), true);
        let characters: Vec<_> = result.by_category(TagCategory::Character).map(|t| t.name.as_str()).collect();
        assert_eq!(characters, vec!["kagamine_rin"]);
        assert_eq!(result.series_tags, vec!["project_diva", "vocaloid"]);

        let result = apply_solo_rule(selected, &labels(), false);
        assert_eq!(result.by_category(TagCategory::Character).count(), 2);
        assert_eq!(result.series_tags, vec!["project_diva", "vocaloid"]);
    }

    #[test]
    fn test_solo_rule_without_solo_tag() {
        let scores = [0.9, 0.0, 0.0, 0.7, 0.95, 0.0, 0.0, 0.0];
        let selected = select_predictions(&scores, &labels(), &filter(10, 10));
        let result = apply_solo_rule(selected, &labels(), true);
        assert_eq!(result.by_category(TagCategory::Character).count(), 2);
    }

    #[test]
    fn test_format_tags_order() {
        let scores = [0.6, 0.0, 0.9, 0.7, 0.0, 0.0, 0.8, 0.0];
        let selected = select_predictions(&scores, &labels(), &filter(10, 10));
        let result = apply_solo_rule(selected, &labels(), true);

        assert_eq!(
            format_tags(&result, true),
            vec!["hatsune miku", "vocaloid", "long hair", "^_^", "1girl"]
        );
        assert_eq!(
            format_tags(&result, false),
            vec!["hatsune_miku", "vocaloid", "long_hair", "^_^", "1girl"]
        );
    }
}
