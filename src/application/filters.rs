//! Derived views over a project collection.
//!
//! Pure and stateless: every read endpoint that narrows or orders the
//! collection goes through these functions, never through cache state.

use crate::domain::projects::ProjectRecord;

/// Projects whose tag set contains `tag`, compared case-insensitively as an
/// exact match (never a substring match).
pub fn by_tag<'a>(projects: &'a [ProjectRecord], tag: &str) -> Vec<&'a ProjectRecord> {
    projects
        .iter()
        .filter(|project| project.tags.iter().any(|t| t.eq_ignore_ascii_case(tag)))
        .collect()
}

/// Projects crediting `name`, compared case-insensitively as an exact match.
pub fn by_person<'a>(projects: &'a [ProjectRecord], name: &str) -> Vec<&'a ProjectRecord> {
    projects
        .iter()
        .filter(|project| {
            project
                .credits
                .iter()
                .any(|credit| credit.name.eq_ignore_ascii_case(name))
        })
        .collect()
}

/// Order by date descending. Records without a date sort after all dated
/// records; relative input order is preserved within each group (stable).
pub fn sort_by_date(projects: &[ProjectRecord]) -> Vec<ProjectRecord> {
    let mut sorted: Vec<ProjectRecord> = projects.to_vec();
    sorted.sort_by(|a, b| match (a.date.as_deref(), b.date.as_deref()) {
        (Some(a), Some(b)) => b.cmp(a),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    sorted
}

/// Every distinct tag across the collection, sorted. Tags differing only in
/// case count as one; the first spelling encountered wins.
pub fn all_tags(projects: &[ProjectRecord]) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    for project in projects {
        for tag in &project.tags {
            if !seen.iter().any(|known| known.eq_ignore_ascii_case(tag)) {
                seen.push(tag.clone());
            }
        }
    }
    seen.sort();
    seen
}
