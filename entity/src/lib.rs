//! SeaORM entities backing the deal pipeline.

pub mod company;
pub mod contact;
pub mod deal;

pub mod prelude {
    pub use super::company::Entity as Company;
    pub use super::contact::Entity as Contact;
    pub use super::deal::Entity as Deal;
}
