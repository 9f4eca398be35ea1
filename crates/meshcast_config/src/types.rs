//! Configuration types deserialized from `meshcast.toml`.

use meshcast_common::ChipCoord;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer};

/// The top-level configuration parsed from `meshcast.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct MeshcastConfig {
    /// Shape and health of the machine being routed onto.
    pub machine: MachineConfig,
    /// Which router to run and its parameters.
    #[serde(default)]
    pub router: RouterSettings,
    /// Weight coefficients of the cost-weighted router.
    #[serde(default)]
    pub dijkstra: DijkstraSettings,
}

/// Dimensions, wraparound, and dead-resource overrides of the machine.
#[derive(Debug, Clone, Deserialize)]
pub struct MachineConfig {
    /// Number of chip columns.
    pub width: u32,
    /// Number of chip rows.
    pub height: u32,
    /// Whether links on the edges wrap around to the far side (torus).
    #[serde(default)]
    pub wrap_around: bool,
    /// Chips that must not carry traffic.
    ///
    /// Accepts either `[[x, y], ...]` or the compact string form `"x,y:x,y"`.
    #[serde(default, deserialize_with = "deserialize_down_chips")]
    pub down_chips: Vec<ChipCoord>,
    /// Links that must not carry traffic, as `(chip, link id)`.
    ///
    /// Accepts either `[[x, y, link], ...]` or the string form
    /// `"x,y,link:x,y,link"`.
    #[serde(default, deserialize_with = "deserialize_down_links")]
    pub down_links: Vec<DownLink>,
    /// Routing table capacity of every chip.
    #[serde(default = "default_router_entries")]
    pub router_entries: u32,
    /// Bandwidth available on every link, in arbitrary units.
    #[serde(default = "default_link_bandwidth")]
    pub link_bandwidth: f64,
}

/// A single dead link: the chip it leaves and its link id (0–5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownLink {
    /// The chip the link leaves from.
    pub chip: ChipCoord,
    /// The link id on that chip.
    pub link: u8,
}

fn default_router_entries() -> u32 {
    1024
}

fn default_link_bandwidth() -> f64 {
    250.0
}

/// Which routing algorithm the pipeline runs.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    /// Neighbour-exploring tree builder followed by dead-link avoidance.
    #[default]
    Ner,
    /// Cost-weighted shortest-path router.
    Dijkstra,
}

/// Router selection and NER parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct RouterSettings {
    /// The routing algorithm to run.
    #[serde(default)]
    pub algorithm: Algorithm,
    /// NER search radius in hops; 0 routes every sink straight from the source.
    #[serde(default = "default_radius")]
    pub radius: u32,
}

fn default_radius() -> u32 {
    20
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::default(),
            radius: default_radius(),
        }
    }
}

/// Link weight coefficients: `w = k + l·(1/free − 1/max) + m·(1/bw − 1/max_bw)`.
#[derive(Debug, Clone, Deserialize)]
pub struct DijkstraSettings {
    /// Constant cost per hop.
    #[serde(default = "default_k")]
    pub k: f64,
    /// Weight of routing-table occupancy on the far chip.
    #[serde(default)]
    pub l: f64,
    /// Weight of bandwidth consumption on the link.
    #[serde(default)]
    pub m: f64,
    /// Bandwidth each committed route consumes on every link it crosses.
    #[serde(default = "default_bandwidth_per_route")]
    pub bandwidth_per_route: f64,
}

fn default_k() -> f64 {
    1.0
}

fn default_bandwidth_per_route() -> f64 {
    1.0
}

impl Default for DijkstraSettings {
    fn default() -> Self {
        Self {
            k: default_k(),
            l: 0.0,
            m: 0.0,
            bandwidth_per_route: default_bandwidth_per_route(),
        }
    }
}

/// Parses `"a,b:c,d"` into groups of `arity` unsigned integers.
fn parse_compact_list<E: de::Error>(v: &str, arity: usize) -> Result<Vec<Vec<u32>>, E> {
    v.split(':')
        .map(str::trim)
        .filter(|group| !group.is_empty())
        .map(|group| {
            let values = group
                .split(',')
                .map(|n| n.trim().parse::<u32>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| E::custom(format!("invalid number in '{group}': {e}")))?;
            if values.len() != arity {
                return Err(E::custom(format!(
                    "expected {arity} values in '{group}', found {}",
                    values.len()
                )));
            }
            Ok(values)
        })
        .collect()
}

/// Deserializes either a compact `"a,b:c,d"` string or a list of integer lists.
fn deserialize_groups<'de, D>(deserializer: D, arity: usize) -> Result<Vec<Vec<u32>>, D::Error>
where
    D: Deserializer<'de>,
{
    struct Groups(usize);

    impl<'de> Visitor<'de> for Groups {
        type Value = Vec<Vec<u32>>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(
                formatter,
                "a ':'-separated string or a list of {}-element lists",
                self.0
            )
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            parse_compact_list(v, self.0)
        }

        fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            let mut groups = Vec::new();
            while let Some(group) = seq.next_element::<Vec<u32>>()? {
                if group.len() != self.0 {
                    return Err(de::Error::invalid_length(group.len(), &self));
                }
                groups.push(group);
            }
            Ok(groups)
        }
    }

    deserializer.deserialize_any(Groups(arity))
}

fn deserialize_down_chips<'de, D>(deserializer: D) -> Result<Vec<ChipCoord>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(deserialize_groups(deserializer, 2)?
        .into_iter()
        .map(|g| ChipCoord::new(g[0], g[1]))
        .collect())
}

fn deserialize_down_links<'de, D>(deserializer: D) -> Result<Vec<DownLink>, D::Error>
where
    D: Deserializer<'de>,
{
    deserialize_groups(deserializer, 3)?
        .into_iter()
        .map(|g| {
            let link = u8::try_from(g[2])
                .map_err(|_| de::Error::custom(format!("link id {} out of range", g[2])))?;
            Ok(DownLink {
                chip: ChipCoord::new(g[0], g[1]),
                link,
            })
        })
        .collect()
}
