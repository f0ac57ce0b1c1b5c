pub mod expr;
pub mod manifest;
pub mod template;

pub use expr::{Expr, pseudo, referenced_ids};
pub use manifest::{
    AssetEntry, MANIFEST_FILE, MANIFEST_VERSION, Manifest, ManifestStack, template_file_name,
};
pub use template::{DeletionPolicy, Export, FORMAT_VERSION, Output, Parameter, Template, TemplateResource};
