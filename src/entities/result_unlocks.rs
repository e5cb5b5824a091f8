use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "result_unlocks")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub result_id: i32,
    pub user_id: String,
    pub unlocked_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::search_results::Entity",
        from = "Column::ResultId",
        to = "super::search_results::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    SearchResults,
}

impl Related<super::search_results::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SearchResults.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
