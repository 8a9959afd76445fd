//! Pagination and sorting for the read paths

use crate::error::{Result, RiskError};
use serde::{Deserialize, Serialize};

/// Largest page a caller may request.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Zero-based page request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub size: u32,
}

impl PageRequest {
    pub fn new(page: u32, size: u32) -> Self {
        Self { page, size }
    }

    /// Size must lie in `1..=MAX_PAGE_SIZE`.
    pub fn validate(&self) -> Result<()> {
        if self.size < 1 || self.size > MAX_PAGE_SIZE {
            return Err(RiskError::invalid(format!(
                "Page size must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }
        Ok(())
    }

    fn offset(&self) -> usize {
        self.page as usize * self.size as usize
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self { page: 0, size: 20 }
    }
}

/// One page of an ordered result set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub content: Vec<T>,
    pub page: u32,
    pub size: u32,
    pub total_elements: u64,
    pub total_pages: u32,
}

impl<T> Page<T> {
    /// Slice an already ordered collection.
    pub fn from_ordered(items: Vec<T>, request: PageRequest) -> Self {
        let total_elements = items.len() as u64;
        let size = request.size.max(1);
        let total_pages = total_elements.div_ceil(size as u64) as u32;
        let content = items
            .into_iter()
            .skip(request.offset())
            .take(size as usize)
            .collect();

        Self {
            content,
            page: request.page,
            size: request.size,
            total_elements,
            total_pages,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// Sortable columns of the flagged-profile listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileSortField {
    #[default]
    #[serde(alias = "averageRiskScore")]
    AverageRiskScore,
    #[serde(alias = "totalTransactions")]
    TotalTransactions,
    #[serde(alias = "highRiskTransactionCount")]
    HighRiskTransactionCount,
    #[serde(alias = "lastTransactionTime")]
    LastTransactionTime,
    #[serde(alias = "userRiskLevel")]
    UserRiskLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    #[serde(alias = "asc")]
    Asc,
    #[default]
    #[serde(alias = "desc")]
    Desc,
}

/// Listing request for flagged profiles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlaggedQuery {
    #[serde(default)]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub size: u32,
    #[serde(default, alias = "sortField")]
    pub sort_field: ProfileSortField,
    #[serde(default)]
    pub direction: SortDirection,
}

fn default_page_size() -> u32 {
    PageRequest::default().size
}

impl FlaggedQuery {
    pub fn page_request(&self) -> PageRequest {
        PageRequest::new(self.page, self.size)
    }
}

impl Default for FlaggedQuery {
    fn default() -> Self {
        Self {
            page: 0,
            size: default_page_size(),
            sort_field: ProfileSortField::default(),
            direction: SortDirection::default(),
        }
    }
}
