use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use camino::Utf8PathBuf;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DiffExprError;

static LEGACY_SET_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^KBaseRNASeq\.RNASeqExpressionSet-\d+\.\d+").expect("static regex")
});
static GENERIC_SET_TYPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^KBaseSets\.ExpressionSet-\d+\.\d+").expect("static regex"));

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectRef(String);

impl ObjectRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ObjectRef {
    type Err = DiffExprError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let is_valid = !trimmed.is_empty()
            && !trimmed.chars().any(char::is_whitespace)
            && trimmed
                .split(';')
                .all(|part| !part.is_empty() && part.split('/').all(|seg| !seg.is_empty()));
        if !is_valid {
            return Err(DiffExprError::Validation(format!(
                "invalid object reference: {value}"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorkspaceName {
    Id(i64),
    Name(String),
}

impl fmt::Display for WorkspaceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkspaceName::Id(id) => write!(f, "{id}"),
            WorkspaceName::Name(name) => write!(f, "{name}"),
        }
    }
}

// Platform-style boolean: JSON `true`/`false` or `0`/`1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Flag {
    Bool(bool),
    Int(i64),
}

impl Flag {
    pub fn is_set(self) -> bool {
        match self {
            Flag::Bool(value) => value,
            Flag::Int(value) => value != 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectInfo {
    pub name: String,
    pub type_tag: String,
}

impl ObjectInfo {
    // Reads the name and type out of a platform object-info tuple
    // (`[objid, name, type, save_date, ...]`).
    pub fn from_tuple(info: &Value) -> Result<Self, DiffExprError> {
        let fields = info
            .as_array()
            .ok_or_else(|| DiffExprError::MalformedResponse("object info is not a list".to_string()))?;
        let text_at = |index: usize| {
            fields
                .get(index)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| {
                    DiffExprError::MalformedResponse(format!("object info missing field {index}"))
                })
        };
        Ok(Self {
            name: text_at(1)?,
            type_tag: text_at(2)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Value,
    pub info: ObjectInfo,
}

impl StoredObject {
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, DiffExprError> {
        serde_json::from_value(self.data.clone()).map_err(|err| {
            DiffExprError::MalformedResponse(format!("{} ({}): {err}", self.info.name, self.info.type_tag))
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpressionSetKind {
    RnaSeq,
    Generic,
}

impl ExpressionSetKind {
    pub fn from_type_tag(type_tag: &str) -> Result<Self, DiffExprError> {
        if LEGACY_SET_TYPE.is_match(type_tag) {
            return Ok(ExpressionSetKind::RnaSeq);
        }
        if GENERIC_SET_TYPE.is_match(type_tag) {
            return Ok(ExpressionSetKind::Generic);
        }
        Err(DiffExprError::UnsupportedShape {
            type_tag: type_tag.to_string(),
            expected: "KBaseRNASeq.RNASeqExpressionSet or KBaseSets.ExpressionSet".to_string(),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RnaSeqExpressionSet {
    #[serde(rename = "alignmentSet_id", default)]
    pub alignment_set_id: Option<String>,
    #[serde(default)]
    pub sampleset_id: Option<String>,
    pub genome_id: ObjectRef,
    pub mapped_expression_ids: Vec<BTreeMap<ObjectRef, ObjectRef>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetItem {
    #[serde(rename = "ref")]
    pub reference: ObjectRef,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenericExpressionSet {
    pub items: Vec<SetItem>,
}

#[derive(Debug, Clone)]
pub enum ExpressionSet {
    RnaSeq(RnaSeqExpressionSet),
    Generic(GenericExpressionSet),
}

impl ExpressionSet {
    pub fn from_stored(object: &StoredObject) -> Result<Self, DiffExprError> {
        match ExpressionSetKind::from_type_tag(&object.info.type_tag)? {
            ExpressionSetKind::RnaSeq => Ok(ExpressionSet::RnaSeq(object.decode()?)),
            ExpressionSetKind::Generic => Ok(ExpressionSet::Generic(object.decode()?)),
        }
    }

    pub fn kind(&self) -> ExpressionSetKind {
        match self {
            ExpressionSet::RnaSeq(_) => ExpressionSetKind::RnaSeq,
            ExpressionSet::Generic(_) => ExpressionSetKind::Generic,
        }
    }

    pub fn sample_count(&self) -> usize {
        match self {
            ExpressionSet::RnaSeq(set) => set.mapped_expression_ids.iter().map(BTreeMap::len).sum(),
            ExpressionSet::Generic(set) => set.items.len(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlignmentRecord {
    pub condition: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExpressionRecord {
    pub condition: String,
    pub genome_id: ObjectRef,
    pub mapped_rnaseq_alignment: BTreeMap<String, ObjectRef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleLink {
    pub expression_ref: ObjectRef,
    pub alignment_ref: ObjectRef,
    pub condition: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionGroup {
    pub label: String,
    pub alignments: Vec<Utf8PathBuf>,
}

impl ConditionGroup {
    pub fn joined(&self) -> String {
        self.alignments
            .iter()
            .map(|path| path.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }
}
