//! Color string <-> color id table shared by a theme and its include

use std::collections::HashMap;

/// Ids start at 1; 0 means "unset" in encoded attributes
#[derive(Debug, Clone, Default)]
pub struct ColorMap {
    /// Uppercased color -> id
    ids: HashMap<String, u32>,
    /// id - 1 -> color as first seen
    colors: Vec<String>,
}

impl ColorMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id for `color`, allocating the next one on first sight (case-insensitive)
    pub fn get_id(&mut self, color: &str) -> u32 {
        let key = color.to_uppercase();
        if let Some(&id) = self.ids.get(&key) {
            return id;
        }

        self.colors.push(color.to_string());
        let id = self.colors.len() as u32;
        self.ids.insert(key, id);
        id
    }

    /// Existing id for `color` without allocating
    pub fn lookup(&self, color: &str) -> Option<u32> {
        self.ids.get(&color.to_uppercase()).copied()
    }

    pub fn get_color(&self, id: u32) -> Option<&str> {
        let index = (id as usize).checked_sub(1)?;
        self.colors.get(index).map(String::as_str)
    }

    /// Colors in id order
    pub fn colors(&self) -> &[String] {
        &self.colors
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }
}
