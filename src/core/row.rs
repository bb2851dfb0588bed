// Row, cell, column and mutation values exchanged with store connections.

#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ColumnRef {
    pub family: String,
    pub qualifier: Vec<u8>,
}

impl ColumnRef {
    pub fn new(family: impl Into<String>, qualifier: impl Into<Vec<u8>>) -> Self {
        Self {
            family: family.into(),
            qualifier: qualifier.into(),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Cell {
    pub column: ColumnRef,
    pub value: Vec<u8>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Row {
    pub key: Vec<u8>,
    pub cells: Vec<Cell>,
}

impl Row {
    pub fn value(&self, family: &str, qualifier: &[u8]) -> Option<&[u8]> {
        self.cells
            .iter()
            .find(|cell| cell.column.family == family && cell.column.qualifier == qualifier)
            .map(|cell| cell.value.as_slice())
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Mutation {
    Put {
        key: Vec<u8>,
        cells: Vec<Cell>,
        write_to_wal: bool,
    },
    Delete {
        key: Vec<u8>,
    },
}

impl Mutation {
    pub fn key(&self) -> &[u8] {
        match self {
            Mutation::Put { key, .. } | Mutation::Delete { key } => key,
        }
    }

    /// Approximate buffered size, used against the write buffer limit.
    pub fn heap_size(&self) -> usize {
        match self {
            Mutation::Put { key, cells, .. } => {
                key.len()
                    + cells
                        .iter()
                        .map(|cell| {
                            cell.column.family.len() + cell.column.qualifier.len() + cell.value.len()
                        })
                        .sum::<usize>()
            }
            Mutation::Delete { key } => key.len(),
        }
    }
}
