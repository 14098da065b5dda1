use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{Frame, Point};

/// Screen rectangle in capture pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    /// Center of the region, clamped to the frame bounds.
    pub fn locate(&self, frame: &Frame) -> Point {
        let cx = self.x.saturating_add(self.width / 2);
        let cy = self.y.saturating_add(self.height / 2);
        Point {
            x: cx.min(frame.width.saturating_sub(1)),
            y: cy.min(frame.height.saturating_sub(1)),
        }
    }
}

/// What to do once the target region is located.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum StepAction {
    Click,
    /// Click the region, then type. `{name}`-style placeholders are filled
    /// from the operation's arguments.
    Type { text: String },
    Key { combo: String },
    Move,
    Scroll { delta: i32 },
    Drag { to: Region },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybookStep {
    pub description: String,
    pub region: Region,
    #[serde(flatten)]
    pub action: StepAction,
    /// Region expected to change; whole capture when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify_region: Option<Region>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Playbook {
    pub steps: Vec<PlaybookStep>,
}

/// Replace `{key}` placeholders with values from `vars`.
pub(crate) fn render(template: &str, vars: &BTreeMap<String, String>) -> String {
    vars.iter().fold(template.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{}}}", key), value)
    })
}

/// Playbooks for the default engine window layout (1920x1080).
pub fn default_playbooks() -> BTreeMap<String, Playbook> {
    let page = Region {
        x: 400,
        y: 200,
        width: 1200,
        height: 700,
    };
    let shape_name_field = Region {
        x: 1620,
        y: 140,
        width: 280,
        height: 24,
    };

    let create_block = Playbook {
        steps: vec![
            PlaybookStep {
                description: "Open the shape search for the block stencil".to_string(),
                region: Region {
                    x: 10,
                    y: 140,
                    width: 360,
                    height: 28,
                },
                action: StepAction::Type {
                    text: "{master}".to_string(),
                },
                verify_region: Some(Region {
                    x: 10,
                    y: 170,
                    width: 360,
                    height: 400,
                }),
            },
            PlaybookStep {
                description: "Drag the first match onto the flowsheet page".to_string(),
                region: Region {
                    x: 10,
                    y: 170,
                    width: 120,
                    height: 60,
                },
                action: StepAction::Drag { to: page },
                verify_region: Some(page),
            },
            PlaybookStep {
                description: "Name the dropped block".to_string(),
                region: shape_name_field,
                action: StepAction::Type {
                    text: "{name}".to_string(),
                },
                verify_region: Some(shape_name_field),
            },
        ],
    };

    let create_stream = Playbook {
        steps: vec![
            PlaybookStep {
                description: "Pick the process stream tool".to_string(),
                region: Region {
                    x: 10,
                    y: 600,
                    width: 120,
                    height: 40,
                },
                action: StepAction::Drag { to: page },
                verify_region: Some(page),
            },
            PlaybookStep {
                description: "Name the dropped stream".to_string(),
                region: shape_name_field,
                action: StepAction::Type {
                    text: "{name}".to_string(),
                },
                verify_region: Some(shape_name_field),
            },
        ],
    };

    let file_name_field = Region {
        x: 560,
        y: 640,
        width: 800,
        height: 28,
    };
    let save_project = Playbook {
        steps: vec![
            PlaybookStep {
                description: "Open the Save As dialog".to_string(),
                region: page,
                action: StepAction::Key {
                    combo: "ctrl+shift+s".to_string(),
                },
                verify_region: None,
            },
            PlaybookStep {
                description: "Enter the project file path".to_string(),
                region: file_name_field,
                action: StepAction::Type {
                    text: "{path}".to_string(),
                },
                verify_region: Some(file_name_field),
            },
            PlaybookStep {
                description: "Confirm the dialog".to_string(),
                region: file_name_field,
                action: StepAction::Key {
                    combo: "enter".to_string(),
                },
                verify_region: None,
            },
        ],
    };

    BTreeMap::from([
        ("create_block".to_string(), create_block),
        ("create_stream".to_string(), create_stream),
        ("save_project".to_string(), save_project),
    ])
}
