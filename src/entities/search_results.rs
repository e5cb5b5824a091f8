use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "search_results")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub job_id: i32,
    pub position: i32,
    pub title: String,
    pub price: Option<f64>,
    pub currency: Option<String>,
    pub image_url: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub seller_name: Option<String>,
    pub listing_url: String,
    pub created_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::search_jobs::Entity",
        from = "Column::JobId",
        to = "super::search_jobs::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    SearchJobs,
    #[sea_orm(has_many = "super::result_unlocks::Entity")]
    ResultUnlocks,
}

impl Related<super::search_jobs::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SearchJobs.def()
    }
}

impl Related<super::result_unlocks::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ResultUnlocks.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
