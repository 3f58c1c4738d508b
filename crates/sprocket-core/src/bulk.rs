//! Bulk-copy descriptors

/// Maps a source field ordinal onto a destination column ordinal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColumnMapping {
    pub source_ordinal: usize,
    pub destination_ordinal: usize,
}

/// A bulk-load operation: destination table plus column-mapping table.
///
/// An empty mapping table means the driver maps columns by position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkCopy {
    destination_table: String,
    column_mappings: Vec<ColumnMapping>,
}

impl BulkCopy {
    pub fn new(destination_table: impl Into<String>) -> Self {
        Self {
            destination_table: destination_table.into(),
            column_mappings: Vec::new(),
        }
    }

    /// Mapping `i -> i` for every source field
    pub fn positional(destination_table: impl Into<String>, field_count: usize) -> Self {
        let mut copy = Self::new(destination_table);
        for ordinal in 0..field_count {
            copy.add_mapping(ordinal, ordinal);
        }
        copy
    }

    /// Mapping `i -> i + 1` for every source field.
    ///
    /// Used when the destination starts with an identity column, which the
    /// source does not carry and which must not receive a value.
    pub fn identity_shifted(destination_table: impl Into<String>, field_count: usize) -> Self {
        let mut copy = Self::new(destination_table);
        for ordinal in 0..field_count {
            copy.add_mapping(ordinal, ordinal + 1);
        }
        copy
    }

    pub fn add_mapping(&mut self, source_ordinal: usize, destination_ordinal: usize) {
        self.column_mappings.push(ColumnMapping {
            source_ordinal,
            destination_ordinal,
        });
    }

    pub fn destination_table(&self) -> &str {
        &self.destination_table
    }

    pub fn column_mappings(&self) -> &[ColumnMapping] {
        &self.column_mappings
    }

    /// Destination ordinal for a source field, if it is mapped
    pub fn destination_for(&self, source_ordinal: usize) -> Option<usize> {
        self.column_mappings
            .iter()
            .find(|m| m.source_ordinal == source_ordinal)
            .map(|m| m.destination_ordinal)
    }
}
