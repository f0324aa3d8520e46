//! Resource registry: the marketplace entity catalog.
//!
//! Each entity kind is declared once here with its URL path segment,
//! payload schema, and reference expansions. The HTTP layer resolves
//! incoming paths against this registry, so adding an entity is one
//! entry in one function.

use std::sync::Arc;

use serde_json::json;

use crate::application::store::Expansion;
use crate::domain::{FieldSpec, Schema, SchemaCatalog};

/// One registered entity kind and how requests reach it.
#[derive(Debug, Clone, Copy)]
pub struct ResourceBinding {
    pub kind: &'static str,
    pub path: &'static str,
    pub expansions: &'static [Expansion],
}

pub struct ResourceRegistry {
    bindings: Vec<ResourceBinding>,
    schemas: Arc<SchemaCatalog>,
}

impl ResourceRegistry {
    /// The full marketplace catalog.
    pub fn marketplace() -> Self {
        let mut entries = Vec::new();
        entries.extend(catalog_entities());
        entries.extend(merchandising_entities());
        entries.extend(commerce_entities());
        entries.extend(account_entities());

        let (schemas, bindings): (Vec<_>, Vec<_>) = entries.into_iter().unzip();
        Self {
            bindings,
            schemas: Arc::new(SchemaCatalog::new(schemas)),
        }
    }

    pub fn find_by_path(&self, path: &str) -> Option<&ResourceBinding> {
        self.bindings.iter().find(|binding| binding.path == path)
    }

    pub fn find_by_kind(&self, kind: &str) -> Option<&ResourceBinding> {
        self.bindings.iter().find(|binding| binding.kind == kind)
    }

    pub fn bindings(&self) -> &[ResourceBinding] {
        &self.bindings
    }

    pub fn schemas(&self) -> Arc<SchemaCatalog> {
        Arc::clone(&self.schemas)
    }
}

fn entry(
    kind: &'static str,
    path: &'static str,
    expansions: &'static [Expansion],
    fields: Vec<FieldSpec>,
) -> (Schema, ResourceBinding) {
    (
        Schema::new(kind, fields),
        ResourceBinding {
            kind,
            path,
            expansions,
        },
    )
}

/// Category tree, brands, and the products hanging off them.
fn catalog_entities() -> Vec<(Schema, ResourceBinding)> {
    vec![
        entry(
            "Category",
            "categories",
            &[],
            vec![
                FieldSpec::text("name").required().unique(),
                FieldSpec::text("logo").required(),
                FieldSpec::number("priority"),
            ],
        ),
        entry(
            "SubCategory",
            "sub-categories",
            const { &[Expansion::new("main_category", &["name"])] },
            vec![
                FieldSpec::text("name").required().unique(),
                FieldSpec::reference("main_category", "Category").required(),
                FieldSpec::number("priority"),
            ],
        ),
        entry(
            "SubSubCategory",
            "sub-sub-categories",
            const {
                &[
                    Expansion::new("main_category", &["name"]),
                    Expansion::new("sub_category", &["name"]),
                ]
            },
            vec![
                FieldSpec::text("name").required().unique(),
                FieldSpec::reference("main_category", "Category").required(),
                FieldSpec::reference("sub_category", "SubCategory").required(),
                FieldSpec::number("priority"),
            ],
        ),
        entry(
            "Brand",
            "brands",
            &[],
            vec![
                FieldSpec::text("name").required().unique(),
                FieldSpec::text("thumbnail"),
                FieldSpec::text("image_alt_text").required(),
                FieldSpec::text("status")
                    .allowed(&["active", "inactive"])
                    .default_to(json!("inactive")),
            ],
        ),
        entry(
            "Product",
            "products",
            const {
                &[
                    Expansion::new("category", &["name"]),
                    Expansion::new("brand", &["name"]),
                ]
            },
            vec![
                FieldSpec::text("name").required(),
                FieldSpec::text("description").required(),
                FieldSpec::reference("category", "Category"),
                FieldSpec::reference("sub_category", "SubCategory"),
                FieldSpec::reference("brand", "Brand"),
                FieldSpec::text("product_type").required(),
                FieldSpec::text("sku").required(),
                FieldSpec::text("unit").required(),
                FieldSpec::text_list("tags"),
                FieldSpec::number("price").required(),
                FieldSpec::number("discount"),
                FieldSpec::text("discount_type").allowed(&["percent", "flat"]),
                FieldSpec::boolean("tax_included").required(),
                FieldSpec::number("minimum_order_qty").required(),
                FieldSpec::number("stock").required(),
                FieldSpec::boolean("is_featured").default_to(json!(false)),
                FieldSpec::text("thumbnail"),
                FieldSpec::text_list("images"),
                FieldSpec::text("status")
                    .allowed(&["pending", "approved", "rejected"])
                    .default_to(json!("pending")),
                FieldSpec::reference("vendor", "Vendor"),
            ],
        ),
    ]
}

/// Promotional surfaces: banners, coupons, and deal campaigns.
fn merchandising_entities() -> Vec<(Schema, ResourceBinding)> {
    vec![
        entry(
            "Banner",
            "banners",
            &[],
            vec![
                FieldSpec::text("banner_type").required(),
                FieldSpec::text("resource_type")
                    .allowed(&["product", "category", "brand"])
                    .required(),
                // Polymorphic target, so this stays an opaque id.
                FieldSpec::text("resource_id"),
                FieldSpec::text("url").required().unique(),
                FieldSpec::text("banner_image").required(),
                FieldSpec::boolean("publish").default_to(json!(false)),
            ],
        ),
        entry(
            "Coupon",
            "coupons",
            const { &[Expansion::new("applicable_products", &["name", "price"])] },
            vec![
                FieldSpec::text("title").required(),
                FieldSpec::text("code").required().unique(),
                FieldSpec::text("discount_bearer").allowed(&["vendor", "customer", "admin"]),
                FieldSpec::text("discount_type").allowed(&["amount", "percentage"]),
                FieldSpec::number("discount_amount"),
                FieldSpec::number("min_purchase"),
                FieldSpec::number("max_discount"),
                FieldSpec::timestamp("start_date"),
                FieldSpec::timestamp("expire_date"),
                FieldSpec::text("status")
                    .allowed(&["active", "inactive"])
                    .default_to(json!("active")),
                FieldSpec::number("user_limit"),
                FieldSpec::reference_list("applicable_products", "Product"),
            ],
        ),
        entry(
            "FlashDeal",
            "flash-deals",
            const { &[Expansion::new("products", &["name", "price", "thumbnail"])] },
            vec![
                FieldSpec::text("title").required(),
                FieldSpec::timestamp("start_date"),
                FieldSpec::timestamp("end_date"),
                FieldSpec::text("image"),
                FieldSpec::text("status")
                    .allowed(&["active", "expired", "inactive"])
                    .default_to(json!("inactive")),
                FieldSpec::boolean("publish").default_to(json!(false)),
                FieldSpec::number("active_products").default_to(json!(0)),
                FieldSpec::reference_list("products", "Product"),
            ],
        ),
        entry(
            "FeaturedDeal",
            "featured-deals",
            const { &[Expansion::new("products", &["name", "price"])] },
            vec![
                FieldSpec::text("title").required(),
                FieldSpec::timestamp("start_date"),
                FieldSpec::timestamp("end_date"),
                FieldSpec::text("status")
                    .allowed(&["active", "expired", "inactive"])
                    .default_to(json!("inactive")),
                FieldSpec::boolean("publish").default_to(json!(false)),
                FieldSpec::number("active_products").default_to(json!(0)),
                FieldSpec::reference_list("products", "Product"),
            ],
        ),
    ]
}

/// Order flow: orders, refunds, and customer wishlists.
fn commerce_entities() -> Vec<(Schema, ResourceBinding)> {
    vec![
        entry(
            "Order",
            "orders",
            const {
                &[
                    Expansion::new("customer", &["first_name", "last_name", "email"]),
                    Expansion::new("products", &["name", "price"]),
                ]
            },
            vec![
                FieldSpec::reference("customer", "Customer").required(),
                FieldSpec::reference_list("products", "Product"),
                FieldSpec::reference_list("vendors", "Vendor"),
                FieldSpec::text("order_status")
                    .allowed(&["pending", "confirmed", "shipped", "delivered", "cancelled"])
                    .default_to(json!("pending")),
                FieldSpec::number("total_amount").required(),
                FieldSpec::text("payment_method")
                    .allowed(&["cash_on_delivery", "card", "digital_wallet"]),
                FieldSpec::text("payment_status")
                    .allowed(&["paid", "unpaid"])
                    .default_to(json!("unpaid")),
                FieldSpec::object("shipping_address"),
                FieldSpec::object("billing_address"),
                FieldSpec::text("order_note"),
            ],
        ),
        entry(
            "Refund",
            "refunds",
            const { &[Expansion::new("order", &["total_amount", "order_status"])] },
            vec![
                FieldSpec::reference("order", "Order").required(),
                FieldSpec::text("status")
                    .allowed(&["pending", "approved", "refunded", "rejected"])
                    .default_to(json!("pending")),
                FieldSpec::text("status_reason"),
                FieldSpec::text("reason").required(),
                FieldSpec::timestamp("requested_at"),
                FieldSpec::timestamp("processed_at"),
            ],
        ),
        entry(
            "Wishlist",
            "wishlists",
            const { &[Expansion::new("products", &["name", "price", "thumbnail"])] },
            vec![
                FieldSpec::reference("customer", "Customer").required(),
                FieldSpec::reference_list("products", "Product"),
                FieldSpec::number("total_products").default_to(json!(0)),
            ],
        ),
    ]
}

/// The people on both sides of the marketplace.
fn account_entities() -> Vec<(Schema, ResourceBinding)> {
    vec![
        entry(
            "Customer",
            "customers",
            &[],
            vec![
                FieldSpec::text("first_name").required(),
                FieldSpec::text("last_name"),
                FieldSpec::text("email").required().unique(),
                FieldSpec::text("phone_number"),
                FieldSpec::text("status")
                    .allowed(&["active", "blocked"])
                    .default_to(json!("active")),
                FieldSpec::text("image"),
            ],
        ),
        entry(
            "Vendor",
            "vendors",
            &[],
            vec![
                FieldSpec::text("first_name").required(),
                FieldSpec::text("last_name").required(),
                FieldSpec::text("phone_number").required(),
                FieldSpec::text("email").required().unique(),
                FieldSpec::text("shop_name").required(),
                FieldSpec::text("address"),
                FieldSpec::text("status")
                    .allowed(&["pending", "approved", "suspended"])
                    .default_to(json!("pending")),
                FieldSpec::text("vendor_image"),
                FieldSpec::text("logo"),
                FieldSpec::text("banner"),
            ],
        ),
    ]
}
