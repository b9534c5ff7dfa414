//! The in-memory list of quotes and the server-wins merge applied to it.

use rand::seq::SliceRandom;

use crate::{
    constants::quotes::{ALL_CATEGORIES, DEFAULT_QUOTES},
    errors::QuoteError,
    models::quotes::{ImportedQuote, MergeReport, Quote},
};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QuoteStore {
    quotes: Vec<Quote>,
}

impl QuoteStore {
    pub fn new(quotes: Vec<Quote>) -> Self {
        QuoteStore { quotes }
    }

    pub fn seeded() -> Self {
        let quotes = DEFAULT_QUOTES
            .iter()
            .map(|(id, text, category)| Quote {
                id: *id,
                text: text.to_string(),
                category: category.to_string(),
            })
            .collect();

        QuoteStore { quotes }
    }

    pub fn quotes(&self) -> &[Quote] {
        &self.quotes
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    /// Validates and appends a new quote, returning it with its assigned id.
    pub fn add(&mut self, text: &str, category: &str) -> Result<Quote, QuoteError> {
        let text = text.trim();
        let category = category.trim();

        if text.is_empty() || category.is_empty() {
            return Err(QuoteError::Validation);
        }

        let quote = Quote {
            id: self.next_id()?,
            text: text.to_string(),
            category: category.to_string(),
        };

        self.quotes.push(quote.clone());

        Ok(quote)
    }

    /// Returns the quotes in `category`, or every quote for the `"all"` filter.
    pub fn filter(&self, category: &str) -> Vec<&Quote> {
        if category == ALL_CATEGORIES {
            return self.quotes.iter().collect();
        }

        let category = category.to_lowercase();

        self.quotes
            .iter()
            .filter(|quote| quote.category.to_lowercase() == category)
            .collect()
    }

    /// Distinct categories, ignoring case like [`QuoteStore::filter`]. Each
    /// one is spelled the way it first appears.
    pub fn categories(&self) -> Vec<&str> {
        let mut seen: Vec<String> = vec![];
        let mut categories: Vec<&str> = vec![];

        for quote in &self.quotes {
            let folded = quote.category.to_lowercase();

            if !seen.contains(&folded) {
                seen.push(folded);
                categories.push(&quote.category);
            }
        }

        categories
    }

    /// Appends every imported entry as-is. Ids are not deduplicated. Nothing
    /// is appended if an id can't be assigned.
    pub fn import_many(&mut self, imported: Vec<ImportedQuote>) -> Result<usize, QuoteError> {
        let count = imported.len();
        let before = self.quotes.len();

        for entry in imported {
            let id = match entry.id {
                Some(id) => id,
                None => match self.next_id() {
                    Ok(id) => id,
                    Err(e) => {
                        self.quotes.truncate(before);
                        return Err(e);
                    }
                },
            };

            self.quotes.push(Quote {
                id,
                text: entry.text,
                category: entry.category,
            });
        }

        Ok(count)
    }

    /// Server-wins merge: remote records overwrite every local quote that
    /// shares their id and are appended otherwise. Local-only quotes stay.
    pub fn merge(&mut self, remote: &[Quote]) -> MergeReport {
        let mut report = MergeReport::default();

        for record in remote {
            let mut matched = false;

            for local in self.quotes.iter_mut().filter(|local| local.id == record.id) {
                matched = true;

                if local != record {
                    *local = record.clone();
                    report.conflicts.push(record.clone());
                }
            }

            if matched {
                report.matched += 1;
            } else {
                self.quotes.push(record.clone());
                report.appended += 1;
            }
        }

        report
    }

    fn next_id(&self) -> Result<i64, QuoteError> {
        let now = (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64;

        match self.quotes.iter().map(|quote| quote.id).max() {
            Some(max) if max >= now => max.checked_add(1).ok_or(QuoteError::IdsExhausted),
            _ => Ok(now),
        }
    }
}

/// Picks a quote uniformly at random.
pub fn pick_random<'a>(quotes: &[&'a Quote]) -> Result<&'a Quote, QuoteError> {
    quotes
        .choose(&mut rand::thread_rng())
        .copied()
        .ok_or(QuoteError::EmptyInput)
}
