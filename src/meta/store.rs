use std::{
    error::Error,
    fmt::{Display, Formatter},
};

use axum::async_trait;
use indexmap::IndexMap;

use super::column::{Column, ColumnKind, RelationKind};
use super::filter::Filter;
use super::model::Model;
use super::sort::Sort;
use super::view::View;

/// A fully resolved relation: both end columns, the related table, and the
/// join table for many to many relations. `mm_model` being absent on a many
/// to many relation is the structural inconsistency the projector turns into
/// a per-column error sentinel.
#[derive(Debug, Clone)]
pub struct Relation {
    pub kind: RelationKind,
    pub related_model: Model,
    /// Column holding the foreign key
    pub child_column: Column,
    /// Referenced column
    pub parent_column: Column,
    pub mm_model: Option<Model>,
    pub mm_child_column: Option<Column>,
    pub mm_parent_column: Option<Column>,
    /// One to one stored on this table's side (behaves like belongs to)
    pub belongs_to: bool,
}

impl Relation {
    /// Whether the relation yields 0..N rows rather than 0..1.
    pub fn is_plural(&self) -> bool {
        matches!(self.kind, RelationKind::ManyToMany | RelationKind::HasMany)
    }
}

/// Read-only access to table/view metadata. Implementations serve
/// already-cached objects; calls are async I/O but never mutate.
#[async_trait]
pub trait MetaStore: Send + Sync {
    async fn get_model(&self, model_id: &str) -> Result<Model, MetaError>;
    async fn get_columns(&self, model_id: &str) -> Result<Vec<Column>, MetaError>;
    async fn get_view(&self, view_id: &str) -> Result<View, MetaError>;
    /// Persisted root filters of a view
    async fn root_filters(&self, view_id: &str) -> Result<Vec<Filter>, MetaError>;
    /// Persisted sorts of a view
    async fn sorts(&self, view_id: &str) -> Result<Vec<Sort>, MetaError>;
    /// Resolve the relation behind a link column
    async fn relation_details(&self, column: &Column) -> Result<Relation, MetaError>;
}

#[derive(Debug)]
pub enum MetaError {
    ModelNotFound(String),
    ViewNotFound(String),
    ColumnNotFound(String),
    NotARelation(String),
}

impl Display for MetaError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            MetaError::ModelNotFound(id) => write!(f, "Model not found: {id}"),
            MetaError::ViewNotFound(id) => write!(f, "View not found: {id}"),
            MetaError::ColumnNotFound(id) => write!(f, "Column not found: {id}"),
            MetaError::NotARelation(id) => {
                write!(f, "Column {id} does not hold a relation")
            }
        }
    }
}

impl Error for MetaError {}

/// In-process metadata store over a fixed set of models and views, typically
/// loaded from the server configuration.
#[derive(Debug, Default, Clone)]
pub struct StaticMetaStore {
    models: IndexMap<String, Model>,
    views: IndexMap<String, View>,
}

impl StaticMetaStore {
    pub fn new(models: Vec<Model>, views: Vec<View>) -> Self {
        Self {
            models: models.into_iter().map(|m| (m.id.clone(), m)).collect(),
            views: views.into_iter().map(|v| (v.id.clone(), v)).collect(),
        }
    }

    fn model(&self, model_id: &str) -> Result<&Model, MetaError> {
        self.models
            .get(model_id)
            .ok_or_else(|| MetaError::ModelNotFound(model_id.to_owned()))
    }

    /// Look a column up by id across every known model.
    fn column_anywhere(&self, column_id: &str) -> Result<(&Model, &Column), MetaError> {
        self.models
            .values()
            .find_map(|model| model.column_by_id(column_id).map(|c| (model, c)))
            .ok_or_else(|| MetaError::ColumnNotFound(column_id.to_owned()))
    }
}

#[async_trait]
impl MetaStore for StaticMetaStore {
    async fn get_model(&self, model_id: &str) -> Result<Model, MetaError> {
        self.model(model_id).cloned()
    }

    async fn get_columns(&self, model_id: &str) -> Result<Vec<Column>, MetaError> {
        Ok(self.model(model_id)?.columns.clone())
    }

    async fn get_view(&self, view_id: &str) -> Result<View, MetaError> {
        self.views
            .get(view_id)
            .cloned()
            .ok_or_else(|| MetaError::ViewNotFound(view_id.to_owned()))
    }

    async fn root_filters(&self, view_id: &str) -> Result<Vec<Filter>, MetaError> {
        Ok(self.get_view(view_id).await?.filters)
    }

    async fn sorts(&self, view_id: &str) -> Result<Vec<Sort>, MetaError> {
        Ok(self.get_view(view_id).await?.sorts)
    }

    async fn relation_details(&self, column: &Column) -> Result<Relation, MetaError> {
        let link = match &column.kind {
            ColumnKind::Link(link) => link,
            _ => return Err(MetaError::NotARelation(column.id.clone())),
        };

        let related_model = self.model(&link.related_model_id)?.clone();
        let (_, child_column) = self.column_anywhere(&link.child_column_id)?;
        let (_, parent_column) = self.column_anywhere(&link.parent_column_id)?;

        // the join table may legitimately fail to resolve; the projector
        // handles that case without failing the row
        let mm_model = link
            .mm_model_id
            .as_ref()
            .and_then(|id| self.models.get(id))
            .cloned();
        let mm_child_column = link
            .mm_child_column_id
            .as_ref()
            .and_then(|id| self.column_anywhere(id).ok())
            .map(|(_, c)| c.clone());
        let mm_parent_column = link
            .mm_parent_column_id
            .as_ref()
            .and_then(|id| self.column_anywhere(id).ok())
            .map(|(_, c)| c.clone());

        Ok(Relation {
            kind: link.relation,
            related_model,
            child_column: child_column.clone(),
            parent_column: parent_column.clone(),
            mm_model,
            mm_child_column,
            mm_parent_column,
            belongs_to: link.belongs_to,
        })
    }
}
