use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "deal")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub name: String,
    #[sea_orm(column_type = "Double")]
    pub value: f64,
    #[sea_orm(indexed)]
    pub stage: Stage,
    pub expected_close_date: Date,
    #[sea_orm(indexed)]
    pub contact_id: Option<i64>,
    #[sea_orm(indexed)]
    pub company_id: Option<i64>,
    #[sea_orm(column_type = "Text", nullable)]
    pub notes: Option<String>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::company::Entity",
        from = "Column::CompanyId",
        to = "super::company::Column::Id"
    )]
    Company,
    #[sea_orm(
        belongs_to = "super::contact::Entity",
        from = "Column::ContactId",
        to = "super::contact::Column::Id"
    )]
    Contact,
}

impl Related<super::company::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Company.def()
    }
}

impl Related<super::contact::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Contact.def()
    }
}

/// Stored as the display label so rows read the same in every backend.
#[derive(Copy, Clone, Debug, EnumIter, DeriveActiveEnum, Eq, PartialEq, Hash)]
#[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
pub enum Stage {
    #[sea_orm(string_value = "Prospecting")]
    Prospecting,
    #[sea_orm(string_value = "Proposal")]
    Proposal,
    #[sea_orm(string_value = "Negotiation")]
    Negotiation,
    #[sea_orm(string_value = "Closed Won")]
    ClosedWon,
    #[sea_orm(string_value = "Closed Lost")]
    ClosedLost,
}

impl ActiveModelBehavior for ActiveModel {}
