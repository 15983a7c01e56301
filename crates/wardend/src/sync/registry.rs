//! Replicated file registry parsed from the template server configuration.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use roxmltree::{Document, Node};
use thiserror::Error;

const REPLICATION_HANDLER_CLASS: &str = "solr.ReplicationHandler";

/// Uppercase names of the files the server's replication writes at runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplicatedFileRegistry {
    names: BTreeSet<String>,
}

/// Errors raised while reading the template server configuration.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to read '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed server configuration: {source}")]
    Parse {
        #[from]
        source: roxmltree::Error,
    },
}

impl ReplicatedFileRegistry {
    /// Reads and parses the template server configuration at `path`.
    pub fn from_template(path: &Path) -> Result<Self, RegistryError> {
        let text = fs::read_to_string(path).map_err(|source| RegistryError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Extracts the replicated file list from a server configuration document.
    ///
    /// The list lives in the `confFiles` entry of the replication handler's
    /// `master` section. A document without that declaration yields an empty
    /// registry.
    pub fn parse(xml: &str) -> Result<Self, RegistryError> {
        let document = Document::parse(xml)?;
        let root = document.root_element();
        if !root.has_tag_name("config") {
            return Ok(Self::default());
        }
        let declaration = root
            .children()
            .filter(|node| is_element(node, "requestHandler", "class", REPLICATION_HANDLER_CLASS))
            .flat_map(|handler| handler.children())
            .filter(|node| is_element(node, "lst", "name", "master"))
            .flat_map(|section| section.children())
            .find(|node| is_element(node, "str", "name", "confFiles"));

        Ok(declaration
            .and_then(|node| node.text())
            .map(Self::from_declaration)
            .unwrap_or_default())
    }

    /// Builds a registry from a comma-separated, case-insensitive file list.
    #[must_use]
    pub fn from_declaration(list: &str) -> Self {
        let names = list
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_uppercase)
            .collect();
        Self { names }
    }

    /// Reports whether `name` is replicated, ignoring case.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(&name.to_uppercase())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

fn is_element(node: &Node<'_, '_>, tag: &str, attribute: &str, value: &str) -> bool {
    node.has_tag_name(tag) && node.attribute(attribute) == Some(value)
}
