//! Template synthesis.
//!
//! Renders every unit of a [`Topology`] into a template file plus a
//! `manifest.json` the orchestrator reads to sequence deployments.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{IacError, IacResult};
use crate::topology::Topology;
use crate::unit::UnitKind;

/// Manifest file name inside the output directory.
pub const MANIFEST_FILE: &str = "manifest.json";

const TEMPLATE_SUFFIX: &str = ".template.json";

/// Manifest schema version.
pub const MANIFEST_VERSION: &str = "1";

/// One synthesized unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactEntry {
    pub id: String,
    pub kind: UnitKind,
    pub template_file: String,
    pub dependencies: Vec<String>,
    pub exports: Vec<String>,
}

/// Description of a synthesized topology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthManifest {
    pub version: String,
    pub environment: String,
    pub namespace: String,
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    pub artifacts: Vec<ArtifactEntry>,
    pub deployment_order: Vec<String>,
    pub teardown_order: Vec<String>,
}

impl SynthManifest {
    pub fn from_file(path: &Path) -> IacResult<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn artifact(&self, id: &str) -> Option<&ArtifactEntry> {
        self.artifacts.iter().find(|a| a.id == id)
    }
}

/// Rendered files, not yet written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthOutput {
    pub manifest: SynthManifest,
    pub files: Vec<(String, String)>,
}

/// Writes templates for a topology into an output directory.
pub struct Synthesizer {
    out_dir: PathBuf,
}

impl Synthesizer {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    pub fn template_file_name(id: &str) -> String {
        format!("{}{}", id, TEMPLATE_SUFFIX)
    }

    /// Render every template and the manifest in memory.
    pub fn render(&self, topology: &Topology) -> IacResult<SynthOutput> {
        let env = topology.environment();
        let graph = topology.graph();
        let mut files = Vec::new();
        let mut artifacts = Vec::new();

        for unit in topology.units_in_deployment_order() {
            let template_file = Self::template_file_name(unit.id());
            let mut content = serde_json::to_string_pretty(&unit.template().to_json())?;
            content.push('\n');
            debug!("Rendered {} ({} bytes)", template_file, content.len());

            artifacts.push(ArtifactEntry {
                id: unit.id().to_string(),
                kind: unit.kind(),
                template_file: template_file.clone(),
                dependencies: graph.dependencies_of(unit.id()).into_iter().map(String::from).collect(),
                exports: unit.exports().into_iter().map(|e| e.name).collect(),
            });
            files.push((template_file, content));
        }

        let manifest = SynthManifest {
            version: MANIFEST_VERSION.to_string(),
            environment: env.name.clone(),
            namespace: env.context.namespace.to_string(),
            region: env.region.clone(),
            account: env.account.clone(),
            artifacts,
            deployment_order: graph.deployment_order(),
            teardown_order: graph.teardown_order(),
        };

        let mut manifest_content = serde_json::to_string_pretty(&manifest)?;
        manifest_content.push('\n');
        files.push((MANIFEST_FILE.to_string(), manifest_content));

        Ok(SynthOutput { manifest, files })
    }

    /// Render, then write everything. Nothing is written if rendering fails.
    ///
    /// Files are staged next to their destination and moved into place with
    /// the manifest last. Templates the new manifest does not list are removed.
    pub fn synthesize(&self, topology: &Topology) -> IacResult<SynthManifest> {
        let output = self.render(topology)?;

        info!("Synthesizing {} files to {:?}", output.files.len(), self.out_dir);
        fs::create_dir_all(&self.out_dir)?;

        let staging = tempfile::Builder::new()
            .prefix(".dbstack-staging-")
            .tempdir_in(&self.out_dir)?;
        for (name, content) in &output.files {
            let path = staging.path().join(name);
            fs::write(&path, content)
                .map_err(|e| IacError::SynthFailed(format!("writing {:?}: {}", path, e)))?;
        }

        // Manifest is last in `files`, so it only lands once every template has.
        for (name, _) in &output.files {
            let target = self.out_dir.join(name);
            fs::rename(staging.path().join(name), &target)
                .map_err(|e| IacError::SynthFailed(format!("moving {:?} into place: {}", target, e)))?;
        }

        self.remove_stale_templates(&output.manifest)?;
        info!("Synthesis complete");
        Ok(output.manifest)
    }

    fn remove_stale_templates(&self, manifest: &SynthManifest) -> IacResult<()> {
        for entry in fs::read_dir(&self.out_dir)? {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let listed = manifest.artifacts.iter().any(|a| a.template_file == name);
            if name.ends_with(TEMPLATE_SUFFIX) && !listed && path.is_file() {
                debug!("Removing stale template {}", name);
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbstack_core::{ContextMap, DeploymentConfig};
    use tempfile::tempdir;

    use crate::topology::assemble_environment;

    #[test]
    fn test_render_manifest() {
        let topology = assemble_environment(&DeploymentConfig::demo(), "demo", &ContextMap::new()).unwrap();
        let output = Synthesizer::new("unused").render(&topology).unwrap();

        let manifest = &output.manifest;
        assert_eq!(manifest.deployment_order, vec!["VpcStackDemo", "RdsStackDemo"]);
        assert_eq!(manifest.teardown_order, vec!["RdsStackDemo", "VpcStackDemo"]);
        assert_eq!(manifest.artifact("RdsStackDemo").unwrap().dependencies, vec!["VpcStackDemo"]);
        assert_eq!(manifest.artifact("RdsStackDemo").unwrap().exports, vec!["SecretArn"]);
        assert!(manifest.artifact("VpcStackDemo").unwrap().dependencies.is_empty());

        let names: Vec<&str> = output.files.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(
            names,
            vec!["VpcStackDemo.template.json", "RdsStackDemo.template.json", "manifest.json"]
        );
    }

    #[test]
    fn test_synthesize_writes_files() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("dbstack.out");
        let topology = assemble_environment(&DeploymentConfig::demo(), "demo", &ContextMap::new()).unwrap();

        let manifest = Synthesizer::new(&out).synthesize(&topology).unwrap();
        assert!(out.join("VpcStackDemo.template.json").exists());
        assert!(out.join("RdsStackDemo.template.json").exists());

        let loaded = SynthManifest::from_file(&out.join(MANIFEST_FILE)).unwrap();
        assert_eq!(loaded, manifest);
        assert_eq!(loaded.region, "ap-northeast-2");
        assert_eq!(loaded.namespace, "Demo");
    }

    #[test]
    fn test_resynthesis_replaces_previous_namespace() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("dbstack.out");
        let config = DeploymentConfig::demo();

        let mut ctx = ContextMap::new();
        ctx.insert("ns".into(), "Blue".into());
        let blue = assemble_environment(&config, "demo", &ctx).unwrap();
        Synthesizer::new(&out).synthesize(&blue).unwrap();
        fs::write(out.join("notes.txt"), "keep me").unwrap();

        ctx.insert("ns".into(), "Green".into());
        let green = assemble_environment(&config, "demo", &ctx).unwrap();
        Synthesizer::new(&out).synthesize(&green).unwrap();

        let mut names: Vec<String> = fs::read_dir(&out)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "RdsStackGreen.template.json",
                "VpcStackGreen.template.json",
                "manifest.json",
                "notes.txt",
            ]
        );
    }
}
