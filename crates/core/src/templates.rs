use std::cmp::Ordering;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use image::{GrayImage, RgbaImage};
use regex::Regex;

use crate::error::{BotError, Result};
use crate::logger;

/// One reference image to look for on screen.
#[derive(Debug, Clone)]
pub struct Template {
    pub name: String,
    pub rgba: RgbaImage,
    pub gray: GrayImage,
    /// Confidence override parsed from the file name.
    pub threshold: Option<f32>,
}

impl Template {
    pub fn new(name: impl Into<String>, rgba: RgbaImage) -> Self {
        let gray = image::DynamicImage::ImageRgba8(rgba.clone()).to_luma8();
        Self {
            name: name.into(),
            rgba,
            gray,
            threshold: None,
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = Some(threshold);
        self
    }
}

/// Templates in match-priority order.
#[derive(Debug, Clone, Default)]
pub struct TemplateSet {
    templates: Vec<Template>,
}

impl TemplateSet {
    /// Build a set from already-decoded templates, ordering them by name.
    pub fn new(mut templates: Vec<Template>) -> Self {
        templates.sort_by(|a, b| human_cmp(&a.name, &b.name));
        Self { templates }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Template> {
        self.templates.iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.templates.iter().map(|t| t.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

impl<'a> IntoIterator for &'a TemplateSet {
    type Item = &'a Template;
    type IntoIter = std::slice::Iter<'a, Template>;

    fn into_iter(self) -> Self::IntoIter {
        self.templates.iter()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Chunk {
    Num(Digits),
    Text(String),
}

/// Digit run compared by numeric value without overflow.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Digits(String);

impl Ord for Digits {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.len().cmp(&other.0.len()).then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for Digits {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn chunk_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[0-9]+|[^0-9]+").expect("static regex"))
}

fn sort_key(name: &str) -> Vec<Chunk> {
    chunk_regex()
        .find_iter(name)
        .map(|m| {
            let s = m.as_str();
            if s.as_bytes()[0].is_ascii_digit() {
                let trimmed = s.trim_start_matches('0');
                Chunk::Num(Digits(trimmed.to_string()))
            } else {
                Chunk::Text(s.to_string())
            }
        })
        .collect()
}

/// Natural ordering: "2_a" < "10_b". Ties fall back to plain string order.
pub fn human_cmp(a: &str, b: &str) -> Ordering {
    sort_key(a).cmp(&sort_key(b)).then_with(|| a.cmp(b))
}

/// Lowest confidence a file name may ask for.
pub const MIN_CONFIDENCE_OVERRIDE: f32 = 0.5;

/// `<order>_c<percent>_<label>` (e.g. `1_c85_close`) sets a per-template
/// confidence of percent/100, never below `MIN_CONFIDENCE_OVERRIDE`.
fn threshold_from_stem(stem: &str) -> Option<f32> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"^[0-9]+_c([0-9]{1,3})_.+$").expect("static regex"));
    let percent: u32 = re.captures(stem)?.get(1)?.as_str().parse().ok()?;
    (1..=100)
        .contains(&percent)
        .then(|| (percent as f32 / 100.0).max(MIN_CONFIDENCE_OVERRIDE))
}

/// Load every decodable image in `dir`, in human-sort order of file names.
///
/// Entries that are directories, hidden, undecodable or duplicate names are
/// skipped and logged. A missing directory is created and reported as
/// `NoTemplates`, as is a directory without a single usable image.
pub fn load_templates(dir: &Path) -> Result<TemplateSet> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)?;
        logger::warn(&format!("created missing templates directory {}", dir.display()));
        return Err(BotError::NoTemplates { dir: dir.to_path_buf(), created: true });
    }

    let mut files: Vec<(String, PathBuf)> = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                logger::warn(&format!("skipping unreadable entry in {}: {}", dir.display(), e));
                continue;
            }
        };
        let path = entry.path();
        let file_name = entry.file_name().to_string_lossy().into_owned();
        if path.is_dir() {
            logger::debug(&format!("skipping {}: is a directory", file_name));
            continue;
        }
        if file_name.starts_with('.') {
            logger::debug(&format!("skipping hidden file {}", file_name));
            continue;
        }
        files.push((file_name, path));
    }
    files.sort_by(|a, b| human_cmp(&a.0, &b.0));

    let mut seen = HashSet::new();
    let mut templates = Vec::new();
    for (file_name, path) in files {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| file_name.clone());
        if seen.contains(&name) {
            logger::warn(&format!("skipping {}: duplicate template name \"{}\"", file_name, name));
            continue;
        }
        let image = match image::open(&path) {
            Ok(img) => img,
            Err(e) => {
                logger::warn(&format!("skipping {}: not an image ({})", file_name, e));
                continue;
            }
        };
        let threshold = threshold_from_stem(&name);
        logger::info(&format!(
            "loaded template {} ({}x{}{})",
            name,
            image.width(),
            image.height(),
            threshold.map(|t| format!(", confidence {:.2}", t)).unwrap_or_default()
        ));
        seen.insert(name.clone());
        templates.push(Template {
            gray: image.to_luma8(),
            rgba: image.to_rgba8(),
            name,
            threshold,
        });
    }

    if templates.is_empty() {
        return Err(BotError::NoTemplates { dir: dir.to_path_buf(), created: false });
    }
    Ok(TemplateSet { templates })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_png(dir: &Path, name: &str) {
        let img = image::RgbaImage::from_pixel(4, 3, image::Rgba([200, 10, 10, 255]));
        img.save(dir.join(name)).unwrap();
    }

    #[test]
    fn test_human_sort_order() {
        let mut names = vec!["10_b.png", "2_a.png", "1_c.png"];
        names.sort_by(|a, b| human_cmp(a, b));
        assert_eq!(names, vec!["1_c.png", "2_a.png", "10_b.png"]);
    }

    #[test]
    fn test_human_sort_mixed_runs() {
        let mut names = vec!["img12b", "img2", "img12a", "img", "007", "7x", "b"];
        names.sort_by(|a, b| human_cmp(a, b));
        assert_eq!(names, vec!["007", "7x", "b", "img", "img2", "img12a", "img12b"]);
    }

    #[test]
    fn test_human_sort_huge_numbers() {
        let a = "99999999999999999999999999_x";
        let b = "100000000000000000000000000_x";
        assert_eq!(human_cmp(a, b), Ordering::Less);
    }

    fn find<'a>(set: &'a TemplateSet, name: &str) -> &'a Template {
        set.iter().find(|t| t.name == name).unwrap()
    }

    #[test]
    fn test_human_sort_ascii_digits_only() {
        // Arabic-Indic three is text, so only the leading "1" is numeric
        assert_eq!(human_cmp("1\u{663}", "10"), Ordering::Less);
        assert_eq!(human_cmp("2\u{663}_a", "10_a"), Ordering::Less);
    }

    #[test]
    fn test_threshold_from_stem() {
        assert_eq!(threshold_from_stem("1_c85_close"), Some(0.85));
        assert_eq!(threshold_from_stem("4_c100_ok"), Some(1.0));
        assert_eq!(threshold_from_stem("2_foo"), None);
        assert_eq!(threshold_from_stem("3_c0_bar"), None);
        assert_eq!(threshold_from_stem("3_c250_bar"), None);
    }

    #[test]
    fn test_plain_numbered_names_keep_global_confidence() {
        assert_eq!(threshold_from_stem("1_2_close"), None);
        assert_eq!(threshold_from_stem("1_85_close"), None);
        assert_eq!(threshold_from_stem("12_3_step"), None);
    }

    #[test]
    fn test_threshold_override_has_floor() {
        assert_eq!(threshold_from_stem("1_c10_x"), Some(MIN_CONFIDENCE_OVERRIDE));
        assert_eq!(threshold_from_stem("1_c2_x"), Some(MIN_CONFIDENCE_OVERRIDE));
    }

    #[test]
    fn test_load_orders_and_skips() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "10_b.png");
        write_png(dir.path(), "2_a.png");
        write_png(dir.path(), "1_c.png");
        std::fs::write(dir.path().join("notes.txt"), "hello").unwrap();
        std::fs::create_dir(dir.path().join("3_subdir")).unwrap();

        let set = load_templates(dir.path()).unwrap();
        assert_eq!(set.names(), vec!["1_c", "2_a", "10_b"]);
        assert_eq!(find(&set, "2_a").gray.dimensions(), (4, 3));
    }

    #[test]
    fn test_load_reads_threshold() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "1_c90_close.png");
        write_png(dir.path(), "2_2_next.png");
        let set = load_templates(dir.path()).unwrap();
        assert_eq!(find(&set, "1_c90_close").threshold, Some(0.9));
        assert_eq!(find(&set, "2_2_next").threshold, None);
    }

    #[test]
    fn test_load_skips_duplicate_names() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "a.png");
        let img = image::RgbImage::from_pixel(2, 2, image::Rgb([0, 0, 0]));
        img.save(dir.path().join("a.bmp")).unwrap();
        let set = load_templates(dir.path()).unwrap();
        assert_eq!(set.len(), 1);
        // "a.bmp" sorts first and wins
        assert_eq!(find(&set, "a").gray.dimensions(), (2, 2));
    }

    #[test]
    fn test_empty_dir_is_no_templates() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("readme.md"), "# nothing").unwrap();
        match load_templates(dir.path()) {
            Err(BotError::NoTemplates { created, .. }) => assert!(!created),
            other => panic!("expected NoTemplates, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_dir_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nested").join("templates");
        match load_templates(&missing) {
            Err(BotError::NoTemplates { created, .. }) => assert!(created),
            other => panic!("expected NoTemplates, got {:?}", other),
        }
        assert!(missing.is_dir());
    }

    #[test]
    fn test_set_new_sorts_by_name() {
        let img = image::RgbaImage::new(1, 1);
        let set = TemplateSet::new(vec![
            Template::new("10_x", img.clone()),
            Template::new("9_y", img),
        ]);
        assert_eq!(set.names(), vec!["9_y", "10_x"]);
    }
}
