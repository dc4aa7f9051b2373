use serde::{Deserialize, Serialize};

/// Shape tags available to `shape` nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShapeKind {
    Square,
    Circle,
    Diamond,
    Parallelogram,
    Hexagon,
    Triangle,
    Star,
    Cloud,
    Document,
    Pentagon,
    Cylinder,
    Pill,
    ArrowRight,
    ArrowLeft,
    ArrowUp,
    ArrowDown,
    ArrowLeftRight,
}

impl ShapeKind {
    pub const ALL: [ShapeKind; 17] = [
        ShapeKind::Square,
        ShapeKind::Circle,
        ShapeKind::Diamond,
        ShapeKind::Parallelogram,
        ShapeKind::Hexagon,
        ShapeKind::Triangle,
        ShapeKind::Star,
        ShapeKind::Cloud,
        ShapeKind::Document,
        ShapeKind::Pentagon,
        ShapeKind::Cylinder,
        ShapeKind::Pill,
        ShapeKind::ArrowRight,
        ShapeKind::ArrowLeft,
        ShapeKind::ArrowUp,
        ShapeKind::ArrowDown,
        ShapeKind::ArrowLeftRight,
    ];

    /// Wire tag, e.g. `"arrow-left-right"`.
    pub fn as_tag(self) -> &'static str {
        match self {
            ShapeKind::Square => "square",
            ShapeKind::Circle => "circle",
            ShapeKind::Diamond => "diamond",
            ShapeKind::Parallelogram => "parallelogram",
            ShapeKind::Hexagon => "hexagon",
            ShapeKind::Triangle => "triangle",
            ShapeKind::Star => "star",
            ShapeKind::Cloud => "cloud",
            ShapeKind::Document => "document",
            ShapeKind::Pentagon => "pentagon",
            ShapeKind::Cylinder => "cylinder",
            ShapeKind::Pill => "pill",
            ShapeKind::ArrowRight => "arrow-right",
            ShapeKind::ArrowLeft => "arrow-left",
            ShapeKind::ArrowUp => "arrow-up",
            ShapeKind::ArrowDown => "arrow-down",
            ShapeKind::ArrowLeftRight => "arrow-left-right",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|shape| shape.as_tag() == tag)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminalKind {
    Start,
    End,
}

impl TerminalKind {
    pub fn as_tag(self) -> &'static str {
        match self {
            TerminalKind::Start => "start",
            TerminalKind::End => "end",
        }
    }
}

/// Access level a user holds on a persisted diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollaboratorRole {
    Owner,
    Editor,
    Viewer,
}

impl CollaboratorRole {
    pub fn can_write(self) -> bool {
        matches!(self, CollaboratorRole::Owner | CollaboratorRole::Editor)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CollaboratorRole::Owner => "owner",
            CollaboratorRole::Editor => "editor",
            CollaboratorRole::Viewer => "viewer",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "owner" => Some(CollaboratorRole::Owner),
            "editor" => Some(CollaboratorRole::Editor),
            "viewer" => Some(CollaboratorRole::Viewer),
            _ => None,
        }
    }
}

/// Speaker of one exchange in a generation conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeRole {
    User,
    Assistant,
}
