//! Construction of canonical [`ProjectRecord`]s from scraped material.

use serde_json::Value;
use time::format_description::BorrowedFormatItem;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime};

use crate::domain::projects::{ImageRef, MediaItem, MediaKind, ProjectManifest, ProjectRecord};

const OUTPUT_DATE: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// Date layouts accepted from manifests. Parsing is best-effort: anything
/// outside this set passes through unchanged rather than failing the record.
const INPUT_DATES: &[&[BorrowedFormatItem<'static>]] = &[
    format_description!("[year]-[month padding:none]-[day padding:none]"),
    format_description!("[year]/[month padding:none]/[day padding:none]"),
    format_description!("[month padding:none]/[day padding:none]/[year]"),
    format_description!("[month repr:long] [day padding:none], [year]"),
    format_description!("[day padding:none] [month repr:long] [year]"),
];

/// Build the canonical record for one project folder.
///
/// Pure: media ordering, primary-image selection and date normalization all
/// happen here, so the scraper's fetch order never leaks into output.
pub fn normalize(folder: &str, manifest: ProjectManifest, mut media: Vec<MediaItem>) -> ProjectRecord {
    media.sort_by(|a, b| a.filename.cmp(&b.filename));

    let primary_image = media
        .iter()
        .find(|item| item.kind == MediaKind::Image)
        .map(|item| ImageRef {
            filename: item.filename.clone(),
            url: item.url.clone(),
            dimensions: item.dimensions,
        });

    let date = manifest
        .date
        .as_ref()
        .and_then(manifest_date_string)
        .map(|raw| normalize_date(&raw));

    ProjectRecord {
        id: folder.to_string(),
        title: manifest.title.or(manifest.name),
        description: manifest.description,
        tags: manifest.tags,
        credits: manifest.credits,
        date,
        media,
        primary_image,
        extra: manifest.extra,
    }
}

/// Reformat a manifest date to `YYYY-MM-DD` when one of the accepted
/// layouts parses it; otherwise return the input unchanged.
pub fn normalize_date(raw: &str) -> String {
    let trimmed = raw.trim();

    if let Ok(parsed) = OffsetDateTime::parse(trimmed, &Rfc3339) {
        return format_date(parsed.date()).unwrap_or_else(|| raw.to_string());
    }

    for layout in INPUT_DATES {
        if let Ok(parsed) = Date::parse(trimmed, layout) {
            return format_date(parsed).unwrap_or_else(|| raw.to_string());
        }
    }

    raw.to_string()
}

fn format_date(date: Date) -> Option<String> {
    date.format(OUTPUT_DATE).ok()
}

fn manifest_date_string(value: &Value) -> Option<String> {
    match value {
        Value::String(raw) => Some(raw.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::projects::Dimensions;

    fn media(filename: &str, kind: MediaKind) -> MediaItem {
        MediaItem {
            url: format!("https://origin.example/p/media/{filename}"),
            kind,
            filename: filename.to_string(),
            dimensions: None,
            content: String::new(),
        }
    }

    fn manifest_with_date(date: &str) -> ProjectManifest {
        ProjectManifest {
            date: Some(Value::String(date.to_string())),
            ..Default::default()
        }
    }

    #[test]
    fn iso_dates_pass_through_normalized() {
        assert_eq!(normalize_date("2023-04-09"), "2023-04-09");
        assert_eq!(normalize_date("2023-4-9"), "2023-04-09");
    }

    #[test]
    fn slash_and_long_forms_are_reformatted() {
        assert_eq!(normalize_date("2021/07/15"), "2021-07-15");
        assert_eq!(normalize_date("7/15/2021"), "2021-07-15");
        assert_eq!(normalize_date("March 5, 2021"), "2021-03-05");
        assert_eq!(normalize_date("5 March 2021"), "2021-03-05");
    }

    #[test]
    fn rfc3339_timestamps_keep_only_the_date() {
        assert_eq!(normalize_date("2022-12-01T09:30:00Z"), "2022-12-01");
    }

    #[test]
    fn unparseable_dates_pass_through_unchanged() {
        assert_eq!(normalize_date("sometime in spring"), "sometime in spring");
        assert_eq!(normalize_date("Q3 2021"), "Q3 2021");
    }

    #[test]
    fn record_keeps_the_original_string_on_parse_failure() {
        let record = normalize("p", manifest_with_date("early 2020"), Vec::new());
        assert_eq!(record.date.as_deref(), Some("early 2020"));
    }

    #[test]
    fn numeric_manifest_dates_are_stringified() {
        let manifest = ProjectManifest {
            date: Some(Value::from(2021)),
            ..Default::default()
        };
        let record = normalize("p", manifest, Vec::new());
        assert_eq!(record.date.as_deref(), Some("2021"));
    }

    #[test]
    fn media_is_ordered_lexicographically_across_kinds() {
        let items = vec![
            media("zz.md", MediaKind::Notes),
            media("01.jpg", MediaKind::Image),
            media("clip.mp4", MediaKind::Video),
            media("02.png", MediaKind::Image),
        ];

        let record = normalize("p", ProjectManifest::default(), items);
        let names: Vec<&str> = record.media.iter().map(|m| m.filename.as_str()).collect();
        assert_eq!(names, vec!["01.jpg", "02.png", "clip.mp4", "zz.md"]);
    }

    #[test]
    fn primary_image_is_first_image_after_sorting() {
        let mut first = media("b.jpg", MediaKind::Image);
        first.dimensions = Some(Dimensions {
            width: 640,
            height: 480,
        });
        let items = vec![
            media("clip.mp4", MediaKind::Video),
            first,
            media("a.png", MediaKind::Image),
        ];

        let record = normalize("p", ProjectManifest::default(), items);
        let primary = record.primary_image.expect("has images");
        assert_eq!(primary.filename, "a.png");
    }

    #[test]
    fn no_images_means_no_primary() {
        let items = vec![media("clip.mp4", MediaKind::Video)];
        let record = normalize("p", ProjectManifest::default(), items);
        assert!(record.primary_image.is_none());
    }

    #[test]
    fn title_falls_back_to_manifest_name() {
        let manifest = ProjectManifest {
            name: Some("Fallback".to_string()),
            ..Default::default()
        };
        let record = normalize("p", manifest, Vec::new());
        assert_eq!(record.title.as_deref(), Some("Fallback"));
    }
}
