use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::filter::PageRequest;
use crate::spec::Projection;

/// One page of results plus the pagination metadata derived from the total count.
#[derive(Debug, Clone, PartialEq)]
pub struct PagedResult<T> {
    items: Vec<T>,
    page_number: u32,
    page_size: u32,
    total_count: u64,
}

impl<T> PagedResult<T> {
    /// Wraps one page of items. Items beyond the page size are dropped.
    pub fn new(mut items: Vec<T>, page: PageRequest, total_count: u64) -> Self {
        items.truncate(page.size() as usize);
        Self {
            items,
            page_number: page.number(),
            page_size: page.size(),
            total_count,
        }
    }

    pub fn empty(page: PageRequest) -> Self {
        Self::new(Vec::new(), page, 0)
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn page_number(&self) -> u32 {
        self.page_number
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    pub fn total_pages(&self) -> u64 {
        self.total_count.div_ceil(u64::from(self.page_size))
    }

    pub fn has_previous(&self) -> bool {
        self.page_number > 1
    }

    pub fn has_next(&self) -> bool {
        u64::from(self.page_number) < self.total_pages()
    }

    /// Transforms every item, keeping order, count and pagination metadata.
    pub fn map<R, F>(self, f: F) -> PagedResult<R>
    where
        F: FnMut(T) -> R,
    {
        PagedResult {
            items: self.items.into_iter().map(f).collect(),
            page_number: self.page_number,
            page_size: self.page_size,
            total_count: self.total_count,
        }
    }
}

impl<T: Serialize> PagedResult<T> {
    /// Serializes each item and keeps only the projected fields.
    pub fn project(self, projection: &Projection) -> Result<PagedResult<Value>, serde_json::Error> {
        let mut projected = Vec::with_capacity(self.items.len());
        for item in &self.items {
            projected.push(project_value(serde_json::to_value(item)?, projection));
        }
        Ok(PagedResult {
            items: projected,
            page_number: self.page_number,
            page_size: self.page_size,
            total_count: self.total_count,
        })
    }
}

fn project_value(value: Value, projection: &Projection) -> Value {
    match value {
        Value::Object(object) => Value::Object(
            object
                .into_iter()
                .filter(|(key, _)| projection.contains(key))
                .collect::<Map<String, Value>>(),
        ),
        other => other,
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PagedResultWire<'a, T> {
    items: &'a [T],
    page_number: u32,
    page_size: u32,
    total_count: u64,
    total_pages: u64,
    has_previous: bool,
    has_next: bool,
}

impl<T: Serialize> Serialize for PagedResult<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        PagedResultWire {
            items: &self.items,
            page_number: self.page_number,
            page_size: self.page_size,
            total_count: self.total_count,
            total_pages: self.total_pages(),
            has_previous: self.has_previous(),
            has_next: self.has_next(),
        }
        .serialize(serializer)
    }
}
