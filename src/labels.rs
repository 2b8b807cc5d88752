//! PlantVillage label table
//!
//! Maps a model output index to the disease class it stands for. The order is
//! the byte-wise sorted list of PlantVillage class directory names, which is
//! the index assignment a directory-based dataset loader produces and the one
//! the pretrained models were trained against.

use std::collections::HashSet;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use crate::utils::error::{PlantVillageError, Result};

/// Number of disease classes in the PlantVillage label set
pub const NUM_CLASSES: usize = 38;

/// Class names in model output order. Format: "Plant___Disease" or "Plant___healthy"
pub const CLASS_NAMES: [&str; NUM_CLASSES] = [
    "Apple___Apple_scab",
    "Apple___Black_rot",
    "Apple___Cedar_apple_rust",
    "Apple___healthy",
    "Blueberry___healthy",
    "Cherry_(including_sour)___Powdery_mildew",
    "Cherry_(including_sour)___healthy",
    "Corn_(maize)___Cercospora_leaf_spot Gray_leaf_spot",
    "Corn_(maize)___Common_rust_",
    "Corn_(maize)___Northern_Leaf_Blight",
    "Corn_(maize)___healthy",
    "Grape___Black_rot",
    "Grape___Esca_(Black_Measles)",
    "Grape___Leaf_blight_(Isariopsis_Leaf_Spot)",
    "Grape___healthy",
    "Orange___Haunglongbing_(Citrus_greening)",
    "Peach___Bacterial_spot",
    "Peach___healthy",
    "Pepper,_bell___Bacterial_spot",
    "Pepper,_bell___healthy",
    "Potato___Early_blight",
    "Potato___Late_blight",
    "Potato___healthy",
    "Raspberry___healthy",
    "Soybean___healthy",
    "Squash___Powdery_mildew",
    "Strawberry___Leaf_scorch",
    "Strawberry___healthy",
    "Tomato___Bacterial_spot",
    "Tomato___Early_blight",
    "Tomato___Late_blight",
    "Tomato___Leaf_Mold",
    "Tomato___Septoria_leaf_spot",
    "Tomato___Spider_mites Two-spotted_spider_mite",
    "Tomato___Target_Spot",
    "Tomato___Tomato_Yellow_Leaf_Curl_Virus",
    "Tomato___Tomato_mosaic_virus",
    "Tomato___healthy",
];

/// Separator between the plant and the condition in a class name
const PLANT_SEPARATOR: &str = "___";

static PLANTVILLAGE: LazyLock<LabelTable> = LazyLock::new(|| LabelTable {
    entries: CLASS_NAMES
        .iter()
        .enumerate()
        .map(|(index, name)| LabelEntry {
            index,
            name: (*name).to_string(),
        })
        .collect(),
});

/// A single class of the label table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEntry {
    pub index: usize,
    pub name: String,
}

/// Ordered, read-only mapping from class index to class name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelTable {
    entries: Vec<LabelEntry>,
}

impl LabelTable {
    /// The shared PlantVillage table, built once per process
    pub fn plantvillage() -> &'static LabelTable {
        &PLANTVILLAGE
    }

    /// Build a table from names in index order
    ///
    /// Rejects empty tables and duplicate names.
    pub fn from_names<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entries: Vec<LabelEntry> = names
            .into_iter()
            .enumerate()
            .map(|(index, name)| LabelEntry {
                index,
                name: name.into(),
            })
            .collect();

        if entries.is_empty() {
            return Err(PlantVillageError::Config(
                "label table must contain at least one class".to_string(),
            ));
        }

        let mut seen = HashSet::with_capacity(entries.len());
        for entry in &entries {
            if !seen.insert(entry.name.as_str()) {
                return Err(PlantVillageError::Config(format!(
                    "duplicate label '{}' at index {}",
                    entry.name, entry.index
                )));
            }
        }

        Ok(Self { entries })
    }

    /// Get the class name for a given index
    pub fn lookup(&self, index: usize) -> Result<&str> {
        self.entries
            .get(index)
            .map(|entry| entry.name.as_str())
            .ok_or(PlantVillageError::OutOfRange {
                index,
                len: self.entries.len(),
            })
    }

    /// Get the index for a given class name
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|entry| entry.name == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LabelEntry> {
        self.entries.iter()
    }

    /// Get the plant name from a class (e.g., "Tomato" from "Tomato___Bacterial_spot")
    pub fn plant_name(&self, index: usize) -> Result<&str> {
        let name = self.lookup(index)?;
        Ok(name.split(PLANT_SEPARATOR).next().unwrap_or(name))
    }

    /// Check if a class represents a healthy plant (not diseased)
    pub fn is_healthy(&self, index: usize) -> Result<bool> {
        Ok(self.lookup(index)?.ends_with("healthy"))
    }

    /// Class name as shown to users: first letter upper-cased, the rest lower-cased
    pub fn display_name(&self, index: usize) -> Result<String> {
        Ok(capitalize(self.lookup(index)?))
    }

    /// Distinct plants covered by the table, in table order, with readable spelling
    ///
    /// "Pepper,_bell" becomes "Pepper, bell" and "Corn_(maize)" becomes "Corn (maize)".
    pub fn supported_plants(&self) -> Vec<String> {
        let mut plants: Vec<String> = Vec::new();
        for entry in &self.entries {
            let plant = entry
                .name
                .split(PLANT_SEPARATOR)
                .next()
                .unwrap_or(&entry.name)
                .replace('_', " ");
            if !plants.contains(&plant) {
                plants.push(plant);
            }
        }
        plants
    }
}

/// Upper-case the first character and lower-case the rest
pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plantvillage_table_is_dense_and_sized() {
        let table = LabelTable::plantvillage();
        assert_eq!(table.len(), NUM_CLASSES);
        for (i, entry) in table.iter().enumerate() {
            assert_eq!(entry.index, i);
        }
    }

    #[test]
    fn test_plantvillage_table_is_byte_sorted() {
        let mut sorted = CLASS_NAMES.to_vec();
        sorted.sort();
        assert_eq!(sorted, CLASS_NAMES.to_vec());
    }

    #[test]
    fn test_lookup() {
        let table = LabelTable::plantvillage();
        assert_eq!(table.lookup(0).unwrap(), "Apple___Apple_scab");
        assert_eq!(table.lookup(37).unwrap(), "Tomato___healthy");
    }

    #[test]
    fn test_lookup_one_past_end_is_out_of_range() {
        let err = LabelTable::plantvillage().lookup(38).unwrap_err();
        assert!(matches!(
            err,
            PlantVillageError::OutOfRange { index: 38, len: 38 }
        ));
    }

    #[test]
    fn test_index_of() {
        let table = LabelTable::plantvillage();
        assert_eq!(table.index_of("Apple___Apple_scab"), Some(0));
        assert_eq!(table.index_of("Tomato___healthy"), Some(37));
        assert_eq!(table.index_of("Unknown___class"), None);
    }

    #[test]
    fn test_is_healthy_and_plant_name() {
        let table = LabelTable::plantvillage();
        assert!(!table.is_healthy(0).unwrap());
        assert!(table.is_healthy(3).unwrap());
        assert_eq!(table.plant_name(28).unwrap(), "Tomato");
        assert_eq!(table.plant_name(18).unwrap(), "Pepper,_bell");
    }

    #[test]
    fn test_healthy_markers_over_table() {
        let table = LabelTable::plantvillage();
        let healthy: Vec<usize> = table
            .iter()
            .filter(|entry| table.is_healthy(entry.index).unwrap())
            .map(|entry| entry.index)
            .collect();
        assert_eq!(healthy.len(), 12);
        assert!(healthy.contains(&37));
        assert!(!healthy.contains(&36));
    }

    #[test]
    fn test_display_name() {
        let table = LabelTable::plantvillage();
        assert_eq!(table.display_name(0).unwrap(), "Apple___apple_scab");
        assert_eq!(capitalize(""), "");
        assert_eq!(capitalize("tOMATO"), "Tomato");
    }

    #[test]
    fn test_supported_plants() {
        let plants = LabelTable::plantvillage().supported_plants();
        assert_eq!(plants.len(), 14);
        assert_eq!(plants[0], "Apple");
        assert!(plants.contains(&"Pepper, bell".to_string()));
        assert!(plants.contains(&"Corn (maize)".to_string()));
    }

    #[test]
    fn test_from_names_rejects_duplicates_and_empty() {
        assert!(LabelTable::from_names(["a", "b", "a"]).is_err());
        assert!(LabelTable::from_names(Vec::<String>::new()).is_err());

        let table = LabelTable::from_names(["healthy", "sick"]).unwrap();
        assert_eq!(table.lookup(1).unwrap(), "sick");
    }
}
