//! # Index Controller
//!
//! Secondary-index definitions are serialized per revision into
//! `INDEXES/<revision>.xml` under the resource directory. The read path only
//! needs the "load definitions for revision r" hook: the definitions name
//! which index slots exist on the name, path and CAS pages. A missing file
//! simply means no secondary indexes were defined for the revision; a
//! malformed file is an I/O error.
//!
//! Expected shape:
//!
//! ```xml
//! <indexes>
//!   <index type="PATH" id="0" unique="false" paths="/book/chapter"/>
//!   <index type="CAS" id="1" unique="true" paths="/book/@isbn"/>
//! </indexes>
//! ```

use std::fs;

use eyre::{bail, Result, WrapErr};
use quick_xml::events::Event;
use quick_xml::Reader as XmlReader;

use crate::config::ResourceConfig;

/// Kind of a secondary index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexType {
    Name,
    Path,
    Cas,
}

impl IndexType {
    fn parse(value: &str) -> Result<Self> {
        match value {
            "NAME" => Ok(IndexType::Name),
            "PATH" => Ok(IndexType::Path),
            "CAS" => Ok(IndexType::Cas),
            other => bail!("unknown index type '{}'", other),
        }
    }
}

/// One secondary-index definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDef {
    index_type: IndexType,
    id: i32,
    unique: bool,
    paths: Vec<String>,
}

impl IndexDef {
    pub fn new(index_type: IndexType, id: i32, unique: bool, paths: Vec<String>) -> Self {
        Self {
            index_type,
            id,
            unique,
            paths,
        }
    }

    pub fn index_type(&self) -> IndexType {
        self.index_type
    }

    /// Slot of this index on its named page.
    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn paths(&self) -> &[String] {
        &self.paths
    }
}

/// Index definitions of one revision.
#[derive(Debug, Clone, Default)]
pub struct IndexController {
    indexes: Vec<IndexDef>,
}

impl IndexController {
    pub fn new(indexes: Vec<IndexDef>) -> Self {
        Self { indexes }
    }

    /// Loads the definitions serialized for `revision`. A missing file
    /// yields an empty controller.
    pub fn load(config: &ResourceConfig, revision: u32) -> Result<Self> {
        let path = config.index_definitions_file(revision);
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(&path).wrap_err_with(|| {
            format!(
                "failed to read index definitions '{}'",
                path.display()
            )
        })?;
        Self::deserialize(&text)
            .wrap_err_with(|| format!("failed to deserialize index definitions '{}'", path.display()))
    }

    fn deserialize(text: &str) -> Result<Self> {
        let mut reader = XmlReader::from_str(text);
        reader.config_mut().trim_text(true);

        let mut indexes = Vec::new();
        loop {
            match reader.read_event()? {
                Event::Start(element) | Event::Empty(element) => {
                    if element.name().as_ref() != b"index" {
                        continue;
                    }
                    let mut index_type = None;
                    let mut id = 0i32;
                    let mut unique = false;
                    let mut paths = Vec::new();
                    for attribute in element.attributes() {
                        let attribute = attribute?;
                        let value = attribute.unescape_value()?;
                        match attribute.key.as_ref() {
                            b"type" => index_type = Some(IndexType::parse(&value)?),
                            b"id" => {
                                id = value
                                    .parse()
                                    .wrap_err_with(|| format!("invalid index id '{}'", value))?
                            }
                            b"unique" => unique = value == "true",
                            b"paths" => {
                                paths = value
                                    .split(';')
                                    .filter(|p| !p.is_empty())
                                    .map(str::to_owned)
                                    .collect()
                            }
                            _ => {}
                        }
                    }
                    let Some(index_type) = index_type else {
                        bail!("index definition is missing the 'type' attribute");
                    };
                    indexes.push(IndexDef::new(index_type, id, unique, paths));
                }
                Event::Eof => break,
                _ => {}
            }
        }
        Ok(Self { indexes })
    }

    pub fn indexes(&self) -> &[IndexDef] {
        &self.indexes
    }

    pub fn index_count(&self) -> usize {
        self.indexes.len()
    }

    pub fn indexes_of_type(&self, index_type: IndexType) -> impl Iterator<Item = &IndexDef> {
        self.indexes
            .iter()
            .filter(move |def| def.index_type() == index_type)
    }
}
