use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "searches")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub user_id: String,
    pub query: String,
    /// `SearchFilters` as JSON.
    pub filters_json: String,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::search_jobs::Entity")]
    SearchJobs,
}

impl Related<super::search_jobs::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SearchJobs.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
