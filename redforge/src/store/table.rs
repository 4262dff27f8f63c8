//! Ordered in-memory table

use serde::{Deserialize, Serialize};

use crate::models::activity::ActivityLog;
use crate::models::catalog::{Domain, Integration, Setting, SshKey, StoredFile, Template};
use crate::models::deployment::Deployment;
use crate::models::infrastructure::{Infrastructure, Resource};

/// A row addressable by a unique key
pub trait Record: Clone {
    fn key(&self) -> &str;
}

/// Rows in insertion order
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Table<T> {
    rows: Vec<T>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self { rows: Vec::new() }
    }
}

impl<T: Record> Table<T> {
    pub fn get(&self, key: &str) -> Option<&T> {
        self.rows.iter().find(|r| r.key() == key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut T> {
        self.rows.iter_mut().find(|r| r.key() == key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn find(&self, pred: impl Fn(&T) -> bool) -> Option<&T> {
        self.rows.iter().find(|r| pred(r))
    }

    /// Clones of every row matching `pred`
    pub fn filter(&self, pred: impl Fn(&T) -> bool) -> Vec<T> {
        self.rows.iter().filter(|r| pred(r)).cloned().collect()
    }

    pub fn all(&self) -> Vec<T> {
        self.rows.clone()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.rows.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.rows.iter_mut()
    }

    /// Insert or replace by key
    pub fn upsert(&mut self, row: T) {
        match self.get_mut(row.key()) {
            Some(existing) => *existing = row,
            None => self.rows.push(row),
        }
    }

    /// Apply `f` to the row with `key`, returning the updated row
    pub fn update(&mut self, key: &str, f: impl FnOnce(&mut T)) -> Option<T> {
        let row = self.get_mut(key)?;
        f(row);
        Some(row.clone())
    }

    pub fn remove(&mut self, key: &str) -> Option<T> {
        let index = self.rows.iter().position(|r| r.key() == key)?;
        Some(self.rows.remove(index))
    }

    /// Keep only rows matching `pred`, returning how many were dropped
    pub fn retain(&mut self, pred: impl Fn(&T) -> bool) -> usize {
        let before = self.rows.len();
        self.rows.retain(|r| pred(r));
        before - self.rows.len()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

macro_rules! record_by_id {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Record for $ty {
                fn key(&self) -> &str {
                    &self.id
                }
            }
        )*
    };
}

record_by_id!(
    Deployment,
    Infrastructure,
    Resource,
    Integration,
    Template,
    Domain,
    SshKey,
    StoredFile,
    ActivityLog,
);

impl Record for Setting {
    fn key(&self) -> &str {
        &self.name
    }
}
