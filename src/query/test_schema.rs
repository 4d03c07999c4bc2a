//! Music-sales schema shared by the query unit tests.

use std::sync::Arc;

use crate::schema::{Denormalized, Derive, DimensionDef, Schema, TypeDef};

fn derive(name: &str) -> Derive {
    Derive::from_name(name).unwrap()
}

pub(crate) fn music() -> Arc<Schema> {
    let mut schema = Schema::new();
    schema.register_enum("format", [("CD", "cd"), ("Vinyl", "vi")]).unwrap();
    schema
        .register(
            TypeDef::dimension("country")
                .table("countries")
                .with(DimensionDef::new("code", "string").primary())
                .with(DimensionDef::new("name", "string").filterable()),
        )
        .unwrap();
    schema
        .register(
            TypeDef::dimension("label")
                .table("labels")
                .with(DimensionDef::new("id", "integer").primary())
                .with(DimensionDef::new("title", "string").filterable())
                .with(DimensionDef::new("country", "country").nullable().filterable()),
        )
        .unwrap();
    schema
        .register(
            TypeDef::dimension("calendar_day")
                .with(DimensionDef::new("calendar_day", "date").primary().filterable())
                .with(
                    DimensionDef::new("day_of_week", "day_of_week")
                        .filterable()
                        .derive(derive("day_of_week")),
                )
                .with(
                    DimensionDef::new("days_since_epoch", "days_since_epoch")
                        .filterable()
                        .derive(derive("days_since_epoch")),
                ),
        )
        .unwrap();
    schema
        .register(
            TypeDef::fact("sale")
                .table("sales")
                .with(DimensionDef::new("label", "label").nullable().filterable())
                .with(DimensionDef::new("format", "format").filterable())
                .with(DimensionDef::new("price", "integer").group_by(false))
                .with(DimensionDef::new("quantity", "integer").group_by(false))
                .with(
                    DimensionDef::new("calendar_day", "calendar_day")
                        .filterable()
                        .denormalized(Denormalized::All),
                ),
        )
        .unwrap();
    Arc::new(schema)
}
