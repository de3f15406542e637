//! Row model for synced CSV tables.
//!
//! Every table exported by the sync server carries an `_id` column. Untyped
//! rows keep all columns in header order; typed rows deserialize the columns
//! they know by header name and ignore the rest.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

/// Column holding the sync row identifier
pub const ROW_ID_COLUMN: &str = "_id";

/// A row that can be indexed by its sync row id.
pub trait SyncRow
{
    /// Row identifier; empty when the row has none
    fn row_id(&self) -> &str;
}

/// A strongly typed table stored in a single CSV file.
pub trait TypedTable: SyncRow + DeserializeOwned + Clone + Send + Sync + 'static
{
    /// File name of the table inside a data directory
    const FILE_NAME: &'static str;

    /// Table name without extension, used in logs and cache keys
    fn table_name() -> &'static str
    {
        Self::FILE_NAME
            .strip_suffix(".csv")
            .unwrap_or(Self::FILE_NAME)
    }
}

/// Rows that point at a per-form custom table.
pub trait HasCustomTable
{
    /// Form id of the custom table, `None` when the row has no form
    fn custom_table_form_id(&self) -> Option<&str>;
}

/// File name of the custom table for `form_id`.
pub fn custom_table_file_name(form_id: &str) -> String
{
    format!("{form_id}.csv")
}

fn non_empty(value: &str) -> Option<&str>
{
    let value = value.trim();

    (!value.is_empty()).then_some(value)
}

/// Row of an arbitrary table: column name → raw value, in header order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct UntypedRow
{
    columns: IndexMap<String, String>,
}

impl UntypedRow
{
    pub fn from_columns(columns: IndexMap<String, String>) -> Self
    {
        Self { columns }
    }

    /// Value of `column`, if the table has it.
    pub fn get(
        &self,
        column: &str,
    ) -> Option<&str>
    {
        self.columns
            .get(column)
            .map(String::as_str)
    }

    /// Columns in header order.
    pub fn columns(&self) -> impl Iterator<Item = (&str, &str)>
    {
        self.columns
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize
    {
        self.columns
            .len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.columns
            .is_empty()
    }
}

impl SyncRow for UntypedRow
{
    fn row_id(&self) -> &str
    {
        self.get(ROW_ID_COLUMN)
            .unwrap_or_default()
    }
}

impl<K, V> FromIterator<(K, V)> for UntypedRow
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self
    {
        Self {
            columns: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Relief authorization: what a beneficiary may receive and how it is delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authorization
{
    #[serde(rename = "_id")]
    pub row_id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub status: String,

    #[serde(default, rename = "type")]
    pub authorization_type: String,

    /// Form capturing delivery details
    #[serde(default)]
    pub custom_delivery_form_id: String,
}

impl SyncRow for Authorization
{
    fn row_id(&self) -> &str
    {
        &self.row_id
    }
}

impl TypedTable for Authorization
{
    const FILE_NAME: &'static str = "authorizations.csv";
}

impl HasCustomTable for Authorization
{
    fn custom_table_form_id(&self) -> Option<&str>
    {
        non_empty(&self.custom_delivery_form_id)
    }
}

/// Relief entitlement of one beneficiary entity to one authorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entitlement
{
    #[serde(rename = "_id")]
    pub row_id: String,

    #[serde(default)]
    pub authorization_id: String,

    #[serde(default)]
    pub beneficiary_entity_id: String,

    #[serde(default)]
    pub status: String,
}

impl SyncRow for Entitlement
{
    fn row_id(&self) -> &str
    {
        &self.row_id
    }
}

impl TypedTable for Entitlement
{
    const FILE_NAME: &'static str = "entitlements.csv";
}

/// Registered household or other beneficiary unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeneficiaryEntity
{
    #[serde(rename = "_id")]
    pub row_id: String,

    /// Human-facing id printed on cards and vouchers
    #[serde(default)]
    pub beneficiary_entity_id: String,

    #[serde(default)]
    pub status: String,

    #[serde(default)]
    pub custom_beneficiary_entity_form_id: String,
}

impl SyncRow for BeneficiaryEntity
{
    fn row_id(&self) -> &str
    {
        &self.row_id
    }
}

impl TypedTable for BeneficiaryEntity
{
    const FILE_NAME: &'static str = "beneficiary_entities.csv";
}

impl HasCustomTable for BeneficiaryEntity
{
    fn custom_table_form_id(&self) -> Option<&str>
    {
        non_empty(&self.custom_beneficiary_entity_form_id)
    }
}

/// Member of a beneficiary entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Individual
{
    #[serde(rename = "_id")]
    pub row_id: String,

    #[serde(default)]
    pub beneficiary_entity_row_id: String,

    #[serde(default)]
    pub custom_member_form_id: String,
}

impl SyncRow for Individual
{
    fn row_id(&self) -> &str
    {
        &self.row_id
    }
}

impl TypedTable for Individual
{
    const FILE_NAME: &'static str = "individuals.csv";
}

impl HasCustomTable for Individual
{
    fn custom_table_form_id(&self) -> Option<&str>
    {
        non_empty(&self.custom_member_form_id)
    }
}

/// Health visit program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitProgram
{
    #[serde(rename = "_id")]
    pub row_id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub custom_visit_form_id: String,
}

impl SyncRow for VisitProgram
{
    fn row_id(&self) -> &str
    {
        &self.row_id
    }
}

impl TypedTable for VisitProgram
{
    const FILE_NAME: &'static str = "visit_programs.csv";
}

impl HasCustomTable for VisitProgram
{
    fn custom_table_form_id(&self) -> Option<&str>
    {
        non_empty(&self.custom_visit_form_id)
    }
}
