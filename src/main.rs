mod backends;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc;

use clap::Parser;
use glam::{Mat4, Vec2, Vec3};
use veld_collider::ColliderSet;
use veld_jobs::JobSystem;
use veld_render::{FrameCamera, TerrainRenderer};
use veld_world::{OccupancyMap, Terrain, TerrainConfig, load_config_from_path};

use crate::backends::{StatsColliderBackend, StatsDrawBackend};

/// Built-in demo terrain: a 16x16-parcel island with two tree prototypes and
/// grass, used when no config file is given.
const DEMO_CONFIG: &str = r#"
random_seed = 7
parcel_size = 16
max_height = 24.0
bounds = { x = -8, y = -8, width = 16, height = 16 }
detail_distance = 220.0
ground_instance_capacity = 128
tree_instance_capacity = 2048
detail_instance_capacity = 8192
noise = { frequency = 0.03, amplitude = 3.0 }

[[tree_prototypes]]
local_size = 7.0
min_scale_xz = 0.8
max_scale_xz = 1.4
min_scale_y = 0.8
max_scale_y = 1.6
radius = 1.5
lods = [
    { min_screen_size = 0.35, submesh_count = 2 },
    { min_screen_size = 0.12, submesh_count = 2 },
    { min_screen_size = 0.03, submesh_count = 1 },
]

[[tree_prototypes]]
local_size = 3.5
min_scale_xz = 0.7
max_scale_xz = 1.1
min_scale_y = 0.9
max_scale_y = 1.3
radius = 0.8
lods = [
    { min_screen_size = 0.2 },
    { min_screen_size = 0.05 },
]

[[detail_prototypes]]
density = 0.5
min_scale_xz = 0.6
max_scale_xz = 1.2
min_scale_y = 0.5
max_scale_y = 1.4

[[detail_prototypes]]
density = 0.25
min_scale_xz = 0.8
max_scale_xz = 1.0
min_scale_y = 0.8
max_scale_y = 1.0
"#;

#[derive(Parser, Debug)]
#[command(name = "veld", about = "Parcel terrain streaming demo (headless)")]
struct Args {
    /// Terrain config TOML; the built-in demo terrain is used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Frames to drive before exiting.
    #[arg(long, default_value_t = 240)]
    frames: u32,
    /// Worker threads; defaults to available parallelism.
    #[arg(long)]
    workers: Option<usize>,
    /// Watch the config file and hot-reload it between frames.
    #[arg(long, default_value_t = false)]
    watch: bool,
    /// Camera orbit radius in world units.
    #[arg(long, default_value_t = 120.0)]
    orbit_radius: f32,
    /// Camera height in world units.
    #[arg(long, default_value_t = 60.0)]
    orbit_height: f32,
    /// Log a stats line every N frames.
    #[arg(long, default_value_t = 60)]
    stats_every: u32,
}

fn load_terrain(args: &Args) -> Result<Terrain, Box<dyn std::error::Error>> {
    let (config, assets_root) = match &args.config {
        Some(path) => {
            let root = path.parent().map(PathBuf::from).unwrap_or_else(|| ".".into());
            (load_config_from_path(path)?, root)
        }
        None => {
            let config: TerrainConfig = toml::from_str(DEMO_CONFIG)?;
            (config, PathBuf::from("."))
        }
    };

    let mut terrain = Terrain::from_config(&config, &assets_root)?;
    if terrain.occupancy_map().is_none() {
        terrain.set_occupancy_map(Some(demo_occupancy_map(terrain.occupancy_floor)));
    }
    Ok(terrain)
}

/// Radial island: fully occupied rim fading to carved flat ground in the
/// middle, so the demo exercises both sides of the occupancy floor.
fn demo_occupancy_map(floor: u8) -> OccupancyMap {
    const SIZE: usize = 32;
    let mut data = vec![0u8; SIZE * SIZE];
    let center = SIZE as f32 / 2.0 - 0.5;
    for y in 0..SIZE {
        for x in 0..SIZE {
            let dx = (x as f32 - center) / center;
            let dy = (y as f32 - center) / center;
            let rim = (dx * dx + dy * dy).sqrt().clamp(0.0, 1.0);
            let value = floor as f32 + rim * (255.0 - floor as f32);
            data[y * SIZE + x] = value as u8;
        }
    }
    OccupancyMap::from_bytes(SIZE, data).expect("demo map size is a power of two")
}

fn spawn_config_watcher(path: &std::path::Path) -> mpsc::Receiver<()> {
    use notify::{EventKind, RecursiveMode, Watcher};
    let (tx, rx) = mpsc::channel::<()>();
    let watch_path = path.to_path_buf();
    std::thread::spawn(move || {
        let Ok(mut watcher) =
            notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
                if let Ok(event) = res {
                    match event.kind {
                        EventKind::Modify(_)
                        | EventKind::Create(_)
                        | EventKind::Remove(_)
                        | EventKind::Any => {
                            let _ = tx.send(());
                        }
                        _ => {}
                    }
                }
            })
        else {
            log::warn!("config watcher could not start");
            return;
        };
        let _ = watcher.watch(&watch_path, RecursiveMode::NonRecursive);
        loop {
            std::thread::sleep(std::time::Duration::from_secs(3600));
        }
    });
    rx
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let terrain = match load_terrain(&args) {
        Ok(terrain) => Arc::new(terrain),
        Err(e) => {
            log::error!("failed to load terrain config: {e}");
            std::process::exit(1);
        }
    };
    let mut terrain = Some(terrain);

    let reload_rx = match (&args.config, args.watch) {
        (Some(path), true) => Some(spawn_config_watcher(path)),
        _ => None,
    };

    let jobs = match args.workers {
        Some(n) => JobSystem::new(n),
        None => JobSystem::with_available_parallelism(),
    };
    log::info!("job system running {} workers", jobs.workers());

    let mut renderer = TerrainRenderer::new();
    let mut draw = StatsDrawBackend::default();
    let tree_prototype_count = terrain
        .as_ref()
        .map(|t| t.tree_prototypes().len())
        .unwrap_or(0);
    let mut colliders = ColliderSet::new(StatsColliderBackend::default(), tree_prototype_count);

    let center = terrain
        .as_ref()
        .map(|t| t.view().world_bounds().center())
        .unwrap_or(Vec3::ZERO);

    for frame in 0..args.frames {
        if let Some(rx) = &reload_rx {
            if rx.try_recv().is_ok() {
                match load_terrain(&args) {
                    Ok(reloaded) => {
                        log::info!("terrain config reloaded");
                        terrain = Some(Arc::new(reloaded));
                    }
                    Err(e) => {
                        log::error!("config reload failed: {e}");
                        terrain = None;
                    }
                }
            }
        }

        let angle = frame as f32 * 1.5f32.to_radians();
        let eye = center
            + Vec3::new(
                angle.cos() * args.orbit_radius,
                args.orbit_height,
                angle.sin() * args.orbit_radius,
            );
        let camera = FrameCamera {
            position: eye,
            view: Mat4::look_at_rh(eye, center, Vec3::Y),
            fov_y_deg: 60.0,
            aspect: 16.0 / 9.0,
            near: 0.3,
            far: 1000.0,
        };

        let frame_stats = renderer.render(terrain.as_ref(), &camera, &jobs, &mut draw);

        if let Some(terrain) = &terrain {
            // One observer pacing a slow loop around the terrain center.
            let walk = frame as f32 * 0.4;
            let observer = Vec2::new(center.x + walk.sin() * 40.0, center.z + walk.cos() * 40.0);
            let collider_stats = colliders.update(&terrain.view(), &[observer], &jobs);

            if args.stats_every > 0 && frame % args.stats_every == 0 {
                log::info!(
                    "frame {frame}: ground={} trees={} detail={} draw_groups={} \
                     colliders used={} free={} baked={}",
                    frame_stats.ground_instances,
                    frame_stats.tree_instances,
                    frame_stats.detail_instances,
                    frame_stats.draw_groups,
                    collider_stats.used,
                    collider_stats.free,
                    collider_stats.baked_this_tick,
                );
            }
        }
    }

    let backend = colliders.backend();
    log::info!(
        "done: {} draw calls, {} instances, {} collider tiles created, \
         {} bake batches ({} meshes), {} tree colliders",
        draw.draw_calls,
        draw.instances,
        backend.tiles_created,
        backend.bake_batches,
        backend.meshes_baked,
        backend.tree_colliders_spawned,
    );
}
