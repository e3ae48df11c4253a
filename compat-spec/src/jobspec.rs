//! Flux jobspecs (version 1) carrying compatibility requirements.

use crate::{CompatibilitySpec, levels::CompatibilityLevel};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const JOBSPEC_VERSION: u32 = 1;
const TASK_SLOT_LABEL: &str = "task";

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Jobspec {
    pub version: u32,
    pub resources: Vec<Resource>,
    pub tasks: Vec<Task>,
    pub attributes: Attributes,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Resource {
    #[serde(rename = "type")]
    pub kind: String,
    pub count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, rename = "with", skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Resource>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Task {
    pub command: Vec<String>,
    pub slot: String,
    pub count: TaskCount,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct TaskCount {
    pub total: u32,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Attributes {
    pub system: SystemAttributes,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct SystemAttributes {
    pub duration: u32,
    pub job: JobAttributes,
    /// Requirement group to attribute to the value it must match.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requires: BTreeMap<String, BTreeMap<String, String>>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct JobAttributes {
    pub name: String,
}

impl Resource {
    fn new(kind: &str, count: u32) -> Self {
        Resource {
            kind: kind.to_string(),
            count,
            label: None,
            children: vec![],
        }
    }
}

impl Jobspec {
    /// # Description
    ///
    /// Build a jobspec that runs `command` as `tasks` tasks spread over
    /// `nodes` nodes, and requires the attributes of `spec` that `level`
    /// matches on. Attributes `spec` leaves unset are not required.
    pub fn from_compatibility_spec(
        spec: &CompatibilitySpec,
        command: &[String],
        nodes: u32,
        tasks: u32,
        name: &str,
        level: CompatibilityLevel,
    ) -> Self {
        let nodes = nodes.max(1);
        let cores_per_node = tasks.div_ceil(nodes).max(1);

        let mut slot = Resource::new("slot", 1);
        slot.label = Some(TASK_SLOT_LABEL.to_string());
        slot.children = vec![Resource::new("core", cores_per_node)];

        let mut node = Resource::new("node", nodes);
        node.children = vec![slot];

        let mut requires = BTreeMap::<String, BTreeMap<String, String>>::new();
        for (group, attrs) in level.attribute_groups() {
            for attr in attrs {
                if let Some(value) = spec.find_attribute(attr) {
                    requires
                        .entry(group.to_string())
                        .or_default()
                        .insert(attr.to_string(), value.to_string());
                }
            }
        }

        Jobspec {
            version: JOBSPEC_VERSION,
            resources: vec![node],
            tasks: vec![Task {
                command: command.to_vec(),
                slot: TASK_SLOT_LABEL.to_string(),
                count: TaskCount { total: tasks },
            }],
            attributes: Attributes {
                system: SystemAttributes {
                    duration: 0,
                    job: JobAttributes {
                        name: name.to_string(),
                    },
                    requires,
                },
            },
        }
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}
