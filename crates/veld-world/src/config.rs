use std::error::Error;
use std::fs;
use std::path::Path;

use fastnoise_lite::{FastNoiseLite, NoiseType};
use glam::IVec2;
use serde::Deserialize;
use veld_geom::ParcelRect;

use crate::occupancy::OccupancyMap;
use crate::trees::{TreeIndex, TreePrototypeData};
use crate::{GroundMesh, TERRAIN_SIZE_LIMIT};

#[derive(Clone, Debug, Deserialize)]
pub struct TerrainConfig {
    #[serde(default = "default_seed")]
    pub random_seed: u32,
    #[serde(default = "default_parcel_size")]
    pub parcel_size: i32,
    #[serde(default)]
    pub bounds: BoundsConfig,
    #[serde(default = "default_max_height")]
    pub max_height: f32,
    /// Occupancy byte at or below which terrain is flat (carved ground).
    #[serde(default = "default_occupancy_floor")]
    pub occupancy_floor: u8,
    #[serde(default = "default_detail_distance")]
    pub detail_distance: f32,
    #[serde(default = "default_true")]
    pub render_ground: bool,
    #[serde(default = "default_true")]
    pub render_trees: bool,
    #[serde(default = "default_true")]
    pub render_detail: bool,
    #[serde(default = "default_ground_capacity")]
    pub ground_instance_capacity: usize,
    #[serde(default = "default_tree_capacity")]
    pub tree_instance_capacity: usize,
    #[serde(default = "default_detail_capacity")]
    pub detail_instance_capacity: usize,
    #[serde(default)]
    pub noise: NoiseConfig,
    #[serde(default)]
    pub occupancy_map: Option<OccupancyMapConfig>,
    #[serde(default)]
    pub trees: TreeSourceConfig,
    #[serde(default)]
    pub tree_prototypes: Vec<TreePrototypeConfig>,
    #[serde(default)]
    pub detail_prototypes: Vec<DetailPrototypeConfig>,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        toml::from_str("").expect("empty config deserializes from defaults")
    }
}

/// Terrain rect in parcels, RectInt-style (origin + size).
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct BoundsConfig {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Default for BoundsConfig {
    fn default() -> Self {
        Self {
            x: -8,
            y: -8,
            width: 16,
            height: 16,
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize)]
pub struct NoiseConfig {
    #[serde(default = "default_noise_frequency")]
    pub frequency: f32,
    #[serde(default = "default_noise_amplitude")]
    pub amplitude: f32,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            frequency: default_noise_frequency(),
            amplitude: default_noise_amplitude(),
        }
    }
}

/// Raw byte file holding a `size` x `size` occupancy bitmap.
#[derive(Clone, Debug, Deserialize)]
pub struct OccupancyMapConfig {
    pub size: usize,
    pub path: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TreeSourceConfig {
    /// Binary tree index asset; takes precedence over scattering.
    #[serde(default)]
    pub path: Option<String>,
    /// Deterministic synthesis cap when no asset is configured.
    #[serde(default = "default_trees_per_parcel")]
    pub max_per_parcel: u32,
}

impl Default for TreeSourceConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_per_parcel: default_trees_per_parcel(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct TreePrototypeConfig {
    /// Real-world size used for screen-size LOD selection.
    pub local_size: f32,
    #[serde(default = "default_one")]
    pub min_scale_xz: f32,
    #[serde(default = "default_one")]
    pub max_scale_xz: f32,
    #[serde(default = "default_one")]
    pub min_scale_y: f32,
    #[serde(default = "default_one")]
    pub max_scale_y: f32,
    #[serde(default = "default_one")]
    pub radius: f32,
    /// Whether this prototype spawns a collider instance per placed tree.
    #[serde(default = "default_true")]
    pub collider: bool,
    pub lods: Vec<TreeLodConfig>,
}

#[derive(Clone, Copy, Debug, Deserialize)]
pub struct TreeLodConfig {
    /// Smallest on-screen size at which this LOD is still used; scanning
    /// advances to the next (coarser) LOD below it.
    pub min_screen_size: f32,
    #[serde(default = "default_submesh_count")]
    pub submesh_count: usize,
}

#[derive(Clone, Copy, Debug, Deserialize)]
pub struct DetailPrototypeConfig {
    /// Grid cells per world unit of parcel edge.
    pub density: f32,
    #[serde(default = "default_one")]
    pub min_scale_xz: f32,
    #[serde(default = "default_one")]
    pub max_scale_xz: f32,
    #[serde(default = "default_one")]
    pub min_scale_y: f32,
    #[serde(default = "default_one")]
    pub max_scale_y: f32,
}

fn default_seed() -> u32 {
    1
}
fn default_parcel_size() -> i32 {
    16
}
fn default_max_height() -> f32 {
    40.0
}
fn default_occupancy_floor() -> u8 {
    173
}
fn default_detail_distance() -> f32 {
    200.0
}
fn default_true() -> bool {
    true
}
fn default_ground_capacity() -> usize {
    256
}
fn default_tree_capacity() -> usize {
    4096
}
fn default_detail_capacity() -> usize {
    16384
}
fn default_noise_frequency() -> f32 {
    0.02
}
fn default_noise_amplitude() -> f32 {
    2.0
}
fn default_trees_per_parcel() -> u32 {
    2
}
fn default_one() -> f32 {
    1.0
}
fn default_submesh_count() -> usize {
    1
}

pub fn load_config_from_path(path: &Path) -> Result<TerrainConfig, Box<dyn Error>> {
    let s = fs::read_to_string(path)?;
    let cfg: TerrainConfig = toml::from_str(&s)?;
    Ok(cfg)
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "terrain asset read failed: {e}"),
            ConfigError::Invalid(msg) => write!(f, "invalid terrain config: {msg}"),
        }
    }
}

impl Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

/// Compiled height noise behind [`crate::TerrainView::height_at`].
pub struct HeightNoise {
    noise: FastNoiseLite,
    amplitude: f32,
}

impl HeightNoise {
    pub fn new(seed: u32, cfg: &NoiseConfig) -> Self {
        let mut noise = FastNoiseLite::with_seed(seed as i32);
        noise.set_noise_type(Some(NoiseType::OpenSimplex2));
        noise.set_frequency(Some(cfg.frequency));
        Self {
            noise,
            amplitude: cfg.amplitude,
        }
    }

    #[inline]
    pub fn sample(&self, x: f32, z: f32) -> f32 {
        self.noise.get_noise_2d(x, z) * self.amplitude
    }
}

/// Runtime terrain state built from a [`TerrainConfig`]: clamped tunables
/// plus the loaded occupancy map, tree index, and prototype tables. Immutable
/// during a frame; replaced wholesale on config reload.
pub struct Terrain {
    pub random_seed: u32,
    pub parcel_size: i32,
    pub bounds: ParcelRect,
    pub max_height: f32,
    pub occupancy_floor: u8,
    pub detail_distance: f32,
    pub render_ground: bool,
    pub render_trees: bool,
    pub render_detail: bool,
    pub ground_instance_capacity: usize,
    pub tree_instance_capacity: usize,
    pub detail_instance_capacity: usize,
    pub tree_prototype_configs: Vec<TreePrototypeConfig>,
    pub detail_prototypes: Vec<DetailPrototypeConfig>,
    tree_prototypes: Vec<TreePrototypeData>,
    occupancy: Option<OccupancyMap>,
    noise: HeightNoise,
    trees: TreeIndex,
}

impl Terrain {
    /// Clamp tunables, compile the noise, and load the occupancy and tree
    /// assets relative to `assets_root`. A malformed occupancy map is
    /// dropped (flat terrain) rather than failing the load.
    pub fn from_config(cfg: &TerrainConfig, assets_root: &Path) -> Result<Self, ConfigError> {
        let random_seed = cfg.random_seed.max(1);
        let parcel_size = cfg.parcel_size.max(1);

        let width = cfg.bounds.width.clamp(0, TERRAIN_SIZE_LIMIT);
        let height = cfg.bounds.height.clamp(0, TERRAIN_SIZE_LIMIT);
        let bounds = ParcelRect::new(
            IVec2::new(cfg.bounds.x, cfg.bounds.y),
            IVec2::new(cfg.bounds.x + width, cfg.bounds.y + height),
        );

        let occupancy = match &cfg.occupancy_map {
            Some(map_cfg) => {
                let bytes = fs::read(assets_root.join(&map_cfg.path))?;
                let map = OccupancyMap::from_bytes(map_cfg.size, bytes);
                if map.is_none() {
                    log::warn!(
                        "occupancy map {} is not a square power of two; terrain will be flat",
                        map_cfg.path
                    );
                }
                map
            }
            None => None,
        };

        let trees = match &cfg.trees.path {
            Some(path) => {
                let mut file = fs::File::open(assets_root.join(path))?;
                TreeIndex::load(&mut file)
                    .map_err(|e| ConfigError::Invalid(e.to_string()))?
            }
            None => TreeIndex::scatter(
                bounds.min,
                bounds.max,
                cfg.tree_prototypes.len(),
                cfg.trees.max_per_parcel,
                random_seed,
            ),
        };

        let mut tree_prototypes = Vec::with_capacity(cfg.tree_prototypes.len());
        let mut mesh_index = 0usize;
        for proto in &cfg.tree_prototypes {
            if proto.lods.is_empty() {
                return Err(ConfigError::Invalid(
                    "tree prototype without LODs".to_string(),
                ));
            }
            tree_prototypes.push(TreePrototypeData {
                local_size: proto.local_size,
                min_scale_xz: proto.min_scale_xz,
                scale_size_xz: proto.max_scale_xz - proto.min_scale_xz,
                min_scale_y: proto.min_scale_y,
                scale_size_y: proto.max_scale_y - proto.min_scale_y,
                radius: proto.radius,
                lod0_mesh_index: mesh_index,
                lod_count: proto.lods.len(),
            });
            mesh_index += proto.lods.len();
        }

        Ok(Self {
            random_seed,
            parcel_size,
            bounds,
            max_height: cfg.max_height,
            occupancy_floor: cfg.occupancy_floor,
            detail_distance: cfg.detail_distance,
            render_ground: cfg.render_ground,
            render_trees: cfg.render_trees,
            render_detail: cfg.render_detail,
            ground_instance_capacity: cfg.ground_instance_capacity.max(1),
            tree_instance_capacity: cfg.tree_instance_capacity.max(1),
            detail_instance_capacity: cfg.detail_instance_capacity.max(1),
            tree_prototype_configs: cfg.tree_prototypes.clone(),
            detail_prototypes: cfg.detail_prototypes.clone(),
            tree_prototypes,
            occupancy,
            noise: HeightNoise::new(random_seed, &cfg.noise),
            trees,
        })
    }

    /// Total tree mesh count: the concatenated LOD lists of every prototype.
    pub fn tree_mesh_count(&self) -> usize {
        self.tree_prototypes
            .iter()
            .map(|p| p.lod_count)
            .sum()
    }

    pub fn ground_mesh_count(&self) -> usize {
        GroundMesh::COUNT
    }

    #[inline]
    pub fn tree_prototypes(&self) -> &[TreePrototypeData] {
        &self.tree_prototypes
    }

    #[inline]
    pub fn occupancy_map(&self) -> Option<&OccupancyMap> {
        self.occupancy.as_ref()
    }

    /// Replace the occupancy map directly (tests, procedural demos).
    pub fn set_occupancy_map(&mut self, map: Option<OccupancyMap>) {
        self.occupancy = map;
    }

    /// Replace the tree index directly (tests, procedural demos).
    pub fn set_tree_index(&mut self, trees: TreeIndex) {
        self.trees = trees;
    }

    pub fn view(&self) -> crate::TerrainView<'_> {
        crate::TerrainView::new(
            self.random_seed,
            self.parcel_size,
            self.bounds,
            self.max_height,
            self.occupancy_floor,
            self.occupancy.as_ref(),
            &self.noise,
            &self.trees,
            &self.tree_prototypes,
        )
    }
}
