//! Resource graph assembly and synthesis.
//!
//! A `Stack` collects typed resource declarations under logical ids, tracks
//! explicit dependency edges, and synthesizes a `Template` after checking that
//! every reference resolves and that the dependency graph is acyclic.
//!
//! Pure functions only — no I/O, no async, no filesystem access.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use strata_common::{
    AssetEntry, DeletionPolicy, Export, Expr, Output, Parameter, Template, TemplateResource,
    referenced_ids,
};

use crate::domain::error::StackError;

static STACK_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    // Safety: this is a compile-time constant pattern — cannot fail.
    #[allow(clippy::expect_used)]
    Regex::new(r"^[A-Za-z][A-Za-z0-9-]{0,127}$").expect("valid regex")
});

/// Maximum logical id length accepted by the provisioning service.
const MAX_LOGICAL_ID_LEN: usize = 255;

/// Typed properties of one resource kind.
pub trait ResourceProps: Serialize {
    /// Provider resource type, e.g. `AWS::EC2::VPC`.
    const TYPE: &'static str;
}

/// A declared resource, used to build references to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceHandle {
    logical_id: String,
    resource_type: &'static str,
}

impl ResourceHandle {
    #[must_use]
    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }

    #[must_use]
    pub fn resource_type(&self) -> &'static str {
        self.resource_type
    }

    /// `{"Ref": logical_id}`
    #[must_use]
    pub fn reference(&self) -> Expr {
        Expr::reference(&self.logical_id)
    }

    /// `{"Fn::GetAtt": [logical_id, name]}`
    #[must_use]
    pub fn attr(&self, name: &str) -> Expr {
        Expr::get_att(&self.logical_id, name)
    }
}

/// One deployable unit of declared resources.
#[derive(Debug, Clone)]
pub struct Stack {
    name: String,
    description: Option<String>,
    resources: BTreeMap<String, TemplateResource>,
    parameters: BTreeMap<String, Parameter>,
    outputs: BTreeMap<String, Output>,
    assets: Vec<AssetEntry>,
}

impl Stack {
    /// Create an empty stack.
    ///
    /// # Errors
    ///
    /// Returns an error if `name` is not a valid stack name.
    pub fn new(name: &str, description: Option<&str>) -> Result<Self> {
        if !STACK_NAME_RE.is_match(name) {
            return Err(StackError::InvalidName(name.to_string()).into());
        }
        Ok(Self {
            name: name.to_string(),
            description: description.map(str::to_string),
            resources: BTreeMap::new(),
            parameters: BTreeMap::new(),
            outputs: BTreeMap::new(),
            assets: Vec::new(),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    #[must_use]
    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    #[must_use]
    pub fn assets(&self) -> &[AssetEntry] {
        &self.assets
    }

    /// Declare a resource under the logical id derived from `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the logical id is taken or the properties cannot
    /// be serialized.
    pub fn add<P: ResourceProps>(&mut self, path: &[&str], props: &P) -> Result<ResourceHandle> {
        let id = logical_id(path);
        let joined = path.join("/");
        if self.resources.contains_key(&id) || self.parameters.contains_key(&id) {
            return Err(StackError::DuplicateLogicalId { id, path: joined }.into());
        }
        let properties = serde_json::to_value(props).map_err(|e| StackError::Serialization {
            path: joined,
            reason: e.to_string(),
        })?;
        self.resources.insert(
            id.clone(),
            TemplateResource {
                resource_type: P::TYPE.to_string(),
                properties,
                depends_on: Vec::new(),
                deletion_policy: None,
                update_replace_policy: None,
                metadata: None,
            },
        );
        Ok(ResourceHandle {
            logical_id: id,
            resource_type: P::TYPE,
        })
    }

    /// Declare that `from` must be created after `on`.
    ///
    /// # Errors
    ///
    /// Returns an error if `from` is not part of this stack.
    pub fn add_dependency(&mut self, from: &ResourceHandle, on: &ResourceHandle) -> Result<()> {
        let entry = self.entry_mut(from)?;
        if !entry.depends_on.iter().any(|d| d == on.logical_id()) {
            entry.depends_on.push(on.logical_id().to_string());
        }
        Ok(())
    }

    /// Set both the deletion and the update-replace policy of a resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the resource is not part of this stack.
    pub fn set_removal_policy(
        &mut self,
        handle: &ResourceHandle,
        policy: DeletionPolicy,
    ) -> Result<()> {
        let entry = self.entry_mut(handle)?;
        entry.deletion_policy = Some(policy);
        entry.update_replace_policy = Some(policy);
        Ok(())
    }

    /// Attach a metadata key to a resource.
    ///
    /// # Errors
    ///
    /// Returns an error if the resource is not part of this stack.
    pub fn add_metadata(&mut self, handle: &ResourceHandle, key: &str, value: Value) -> Result<()> {
        let entry = self.entry_mut(handle)?;
        let metadata = entry
            .metadata
            .get_or_insert_with(|| Value::Object(serde_json::Map::new()));
        if let Value::Object(map) = metadata {
            map.insert(key.to_string(), value);
        }
        Ok(())
    }

    /// Declare a deploy-time parameter and return a reference to it.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is already used.
    pub fn add_parameter(&mut self, id: &str, parameter: Parameter) -> Result<Expr> {
        if self.parameters.contains_key(id) || self.resources.contains_key(id) {
            return Err(StackError::DuplicateParameter(id.to_string()).into());
        }
        self.parameters.insert(id.to_string(), parameter);
        Ok(Expr::reference(id))
    }

    #[must_use]
    pub fn has_parameter(&self, id: &str) -> bool {
        self.parameters.contains_key(id)
    }

    /// Declare a stack output, optionally exported as `<stack>-<id>`.
    ///
    /// # Errors
    ///
    /// Returns an error if the output id is already used.
    pub fn add_output(
        &mut self,
        id: &str,
        value: &Expr,
        description: &str,
        export: bool,
    ) -> Result<()> {
        if self.outputs.contains_key(id) {
            return Err(StackError::DuplicateOutput(id.to_string()).into());
        }
        self.outputs.insert(
            id.to_string(),
            Output {
                value: value.to_value(),
                description: Some(description.to_string()),
                export: export.then(|| Export {
                    name: Value::String(format!("{}-{id}", self.name)),
                }),
            },
        );
        Ok(())
    }

    /// Record a file asset consumed by a resource.
    pub fn add_asset(&mut self, asset: AssetEntry) {
        self.assets.push(asset);
    }

    fn entry_mut(&mut self, handle: &ResourceHandle) -> Result<&mut TemplateResource> {
        self.resources
            .get_mut(handle.logical_id())
            .ok_or_else(|| StackError::UnknownResource(handle.logical_id().to_string()).into())
    }

    /// Dependency edges per resource: explicit `DependsOn` plus every
    /// reference found in its properties.
    fn edges(&self) -> Result<BTreeMap<&str, BTreeSet<String>>> {
        let mut edges = BTreeMap::new();
        for (id, resource) in &self.resources {
            let mut deps: BTreeSet<String> = BTreeSet::new();
            for target in &resource.depends_on {
                if !self.resources.contains_key(target) {
                    return Err(StackError::DanglingReference {
                        from: id.clone(),
                        target: target.clone(),
                    }
                    .into());
                }
                deps.insert(target.clone());
            }
            for target in referenced_ids(&resource.properties) {
                if self.resources.contains_key(&target) {
                    if target != *id {
                        deps.insert(target);
                    } else {
                        return Err(StackError::DependencyCycle(vec![id.clone()]).into());
                    }
                } else if !self.parameters.contains_key(&target) {
                    return Err(StackError::DanglingReference {
                        from: id.clone(),
                        target,
                    }
                    .into());
                }
            }
            edges.insert(id.as_str(), deps);
        }
        Ok(edges)
    }

    /// Order in which the provisioning service may create resources.
    ///
    /// Ties are broken by logical id so the order is stable.
    ///
    /// # Errors
    ///
    /// Returns an error on dangling references or dependency cycles.
    pub fn deployment_order(&self) -> Result<Vec<String>> {
        let edges = self.edges()?;
        let mut remaining: BTreeMap<&str, usize> =
            edges.iter().map(|(id, deps)| (*id, deps.len())).collect();
        let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for (id, deps) in &edges {
            for dep in deps {
                dependents.entry(dep.as_str()).or_default().push(*id);
            }
        }

        let mut ready: BTreeSet<&str> = remaining
            .iter()
            .filter(|(_, n)| **n == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut order = Vec::with_capacity(edges.len());
        while let Some(id) = ready.pop_first() {
            order.push(id.to_string());
            remaining.remove(id);
            for dependent in dependents.get(id).into_iter().flatten() {
                if let Some(n) = remaining.get_mut(dependent) {
                    *n -= 1;
                    if *n == 0 {
                        ready.insert(*dependent);
                    }
                }
            }
        }

        if !remaining.is_empty() {
            let cycle = remaining.keys().map(|id| (*id).to_string()).collect();
            return Err(StackError::DependencyCycle(cycle).into());
        }
        Ok(order)
    }

    /// Validate the graph and produce the template document.
    ///
    /// # Errors
    ///
    /// Returns an error on dangling references (in resources or outputs) or
    /// dependency cycles.
    pub fn synth(&self) -> Result<Template> {
        self.deployment_order()?;
        for (id, output) in &self.outputs {
            for target in referenced_ids(&output.value) {
                if !self.resources.contains_key(&target) && !self.parameters.contains_key(&target)
                {
                    return Err(StackError::DanglingReference {
                        from: format!("output {id}"),
                        target,
                    }
                    .into());
                }
            }
        }

        let mut template = Template::new(self.description.clone());
        template.parameters.clone_from(&self.parameters);
        template.outputs.clone_from(&self.outputs);
        for (id, resource) in &self.resources {
            let mut resource = resource.clone();
            resource.depends_on.sort();
            template.resources.insert(id.clone(), resource);
        }
        Ok(template)
    }
}

/// Derive a logical id from a construct path.
///
/// Non-alphanumeric characters are dropped from every component. A single
/// component is used as is; longer paths get an 8-character uppercase hex
/// suffix from the SHA-256 of the `/`-joined path, so distinct paths that
/// sanitize to the same text still get distinct ids.
#[must_use]
pub fn logical_id(path: &[&str]) -> String {
    let human: String = path
        .iter()
        .flat_map(|part| part.chars().filter(char::is_ascii_alphanumeric))
        .collect();
    if path.len() <= 1 {
        return truncate(human, MAX_LOGICAL_ID_LEN);
    }
    let digest = Sha256::digest(path.join("/").as_bytes());
    let suffix = hex_encode(&digest[..4]).to_ascii_uppercase();
    let mut id = truncate(human, MAX_LOGICAL_ID_LEN - suffix.len());
    id.push_str(&suffix);
    id
}

fn truncate(mut s: String, max: usize) -> String {
    s.truncate(max);
    s
}

/// Encode bytes as lowercase hex string.
#[must_use]
pub fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        out.push(char::from(HEX[(b >> 4) as usize]));
        out.push(char::from(HEX[(b & 0xf) as usize]));
    }
    out
}
