use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::block::PortRole;
use super::composition::Composition;
use super::units::PhaseProperties;

/// Direction of a stream relative to the block it is being connected to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum StreamDirection {
    /// The stream feeds the block.
    Inlet,
    /// The stream leaves the block.
    Outlet,
}

/// One end of a stream as the engine sees it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum StreamEnd {
    Upstream,
    Downstream,
}

impl StreamEnd {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upstream => "upstream",
            Self::Downstream => "downstream",
        }
    }
}

impl StreamDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inlet => "inlet",
            Self::Outlet => "outlet",
        }
    }

    /// Port role the stream must attach to.
    pub fn port_role(&self) -> PortRole {
        match self {
            Self::Inlet => PortRole::Inlet,
            Self::Outlet => PortRole::Outlet,
        }
    }

    /// Inlet streams glue their downstream end, outlet streams their upstream end.
    pub fn glued_end(&self) -> StreamEnd {
        match self {
            Self::Inlet => StreamEnd::Downstream,
            Self::Outlet => StreamEnd::Upstream,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct Endpoint {
    pub block: String,
    pub port: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct Stream {
    pub name: String,
    pub engine_id: String,
    /// Block port this stream leaves from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream: Option<Endpoint>,
    /// Block port this stream feeds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downstream: Option<Endpoint>,
    pub properties: PhaseProperties,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub composition: Option<Composition>,
    pub flashed: bool,
}

impl Stream {
    pub fn new(name: impl Into<String>, engine_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            engine_id: engine_id.into(),
            upstream: None,
            downstream: None,
            properties: PhaseProperties::default(),
            composition: None,
            flashed: false,
        }
    }

    pub fn endpoint(&self, end: StreamEnd) -> Option<&Endpoint> {
        match end {
            StreamEnd::Upstream => self.upstream.as_ref(),
            StreamEnd::Downstream => self.downstream.as_ref(),
        }
    }

    pub fn attach(&mut self, end: StreamEnd, endpoint: Endpoint) {
        match end {
            StreamEnd::Upstream => self.upstream = Some(endpoint),
            StreamEnd::Downstream => self.downstream = Some(endpoint),
        }
    }

    /// Fed from outside the flowsheet: has a destination but no source block.
    pub fn is_feed(&self) -> bool {
        self.upstream.is_none() && self.downstream.is_some()
    }

    /// Whether temperature, pressure, a flow and a composition are all present.
    pub fn is_ready_to_flash(&self) -> bool {
        self.properties.is_fully_specified() && self.composition.is_some()
    }

    /// Drop the flashed state and any engine-derived values.
    pub fn unlock(&mut self) {
        self.flashed = false;
        self.properties.vapor_fraction = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glue_direction() {
        assert_eq!(StreamDirection::Inlet.glued_end(), StreamEnd::Downstream);
        assert_eq!(StreamDirection::Outlet.glued_end(), StreamEnd::Upstream);
        assert_eq!(StreamDirection::Outlet.port_role(), PortRole::Outlet);
    }

    #[test]
    fn test_feed_detection() {
        let mut stream = Stream::new("210", "210");
        assert!(!stream.is_feed());

        stream.attach(
            StreamEnd::Downstream,
            Endpoint {
                block: "301-E".to_string(),
                port: 2,
            },
        );
        assert!(stream.is_feed());
        assert_eq!(stream.endpoint(StreamEnd::Downstream).unwrap().port, 2);
    }

    #[test]
    fn test_ready_to_flash_requires_composition() {
        let mut stream = Stream::new("220", "220");
        stream.properties = PhaseProperties {
            temperature_k: Some(323.15),
            pressure_pa: Some(660_000.0),
            mass_flow_kg_s: Some(12.7),
            ..Default::default()
        };
        assert!(!stream.is_ready_to_flash());

        stream.composition = Some(Composition::new(vec![1.0]));
        assert!(stream.is_ready_to_flash());
    }
}
