//! URL classification and tool selection.
//!
//! Routing is two pure steps: URL -> [`ToolCategory`], then category -> first registry tool whose
//! lowercased name carries every fragment the category requires. Rule order is significant:
//! the first URL test that matches wins, and anything unmatched falls through to
//! [`ToolCategory::GenericBrowse`].

use crate::{Error, Result, ToolDescriptor};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    PersonProfile,
    CompanyProfile,
    JobListings,
    Posts,
    PeopleSearch,
    RepositoryFile,
    GenericBrowse,
}

impl ToolCategory {
    /// Routing order.
    pub const ALL: [ToolCategory; 7] = [
        Self::PersonProfile,
        Self::CompanyProfile,
        Self::JobListings,
        Self::Posts,
        Self::PeopleSearch,
        Self::RepositoryFile,
        Self::GenericBrowse,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PersonProfile => "person_profile",
            Self::CompanyProfile => "company_profile",
            Self::JobListings => "job_listings",
            Self::Posts => "posts",
            Self::PeopleSearch => "people_search",
            Self::RepositoryFile => "repository_file",
            Self::GenericBrowse => "generic_browse",
        }
    }

    /// Lowercase fragments a tool name must contain (all of them) to serve this category.
    pub fn required_name_parts(self) -> &'static [&'static str] {
        match self {
            Self::PersonProfile => &["linkedin", "person_profile"],
            Self::CompanyProfile => &["linkedin", "company_profile"],
            Self::JobListings => &["linkedin", "job_listings"],
            Self::Posts => &["linkedin", "posts"],
            Self::PeopleSearch => &["linkedin", "people_search"],
            Self::RepositoryFile => &["github", "repository_file"],
            Self::GenericBrowse => &["scrape", "browser"],
        }
    }

    /// People search is the only route whose tool takes arguments beyond the URL.
    pub fn needs_person_name(self) -> bool {
        matches!(self, Self::PeopleSearch)
    }

    fn matches_url(self, url: &str) -> bool {
        match self {
            Self::PersonProfile => url.contains("linkedin.com/in/"),
            Self::CompanyProfile => url.contains("linkedin.com/company/"),
            Self::JobListings => url.contains("linkedin.com/jobs/"),
            Self::Posts => url.contains("linkedin.com/feed/update"),
            Self::PeopleSearch => url.contains("linkedin.com/search/results/people"),
            Self::RepositoryFile => url.contains("github.com") && url.contains("/blob/"),
            Self::GenericBrowse => true,
        }
    }

    pub fn matches_tool_name(self, name: &str) -> bool {
        let name = name.to_ascii_lowercase();
        self.required_name_parts()
            .iter()
            .all(|part| name.contains(part))
    }
}

impl std::fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn classify_url(url: &str) -> ToolCategory {
    ToolCategory::ALL
        .into_iter()
        .find(|c| c.matches_url(url))
        .unwrap_or(ToolCategory::GenericBrowse)
}

/// Tool list fetched once at startup and only read afterwards.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolDescriptor>,
}

impl ToolRegistry {
    pub fn new(tools: Vec<ToolDescriptor>) -> Self {
        Self { tools }
    }

    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// First tool in registry order that serves `category`.
    pub fn find(&self, category: ToolCategory) -> Option<&ToolDescriptor> {
        self.tools
            .iter()
            .find(|t| category.matches_tool_name(&t.name))
    }

    /// Categories served by more than one tool, with the candidate names in registry order.
    ///
    /// Selection still picks the first candidate; this only exists so callers can warn.
    pub fn ambiguities(&self) -> Vec<(ToolCategory, Vec<&str>)> {
        ToolCategory::ALL
            .into_iter()
            .filter_map(|c| {
                let names: Vec<&str> = self
                    .tools
                    .iter()
                    .filter(|t| c.matches_tool_name(&t.name))
                    .map(|t| t.name.as_str())
                    .collect();
                (names.len() > 1).then_some((c, names))
            })
            .collect()
    }
}

pub fn select_tool<'a>(registry: &'a ToolRegistry, url: &str) -> Result<&'a ToolDescriptor> {
    let category = classify_url(url);
    registry.find(category).ok_or_else(|| {
        Error::ToolNotFound(format!(
            "{category} (needs a tool named with: {})",
            category.required_name_parts().join(" + ")
        ))
    })
}
