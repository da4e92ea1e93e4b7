//! Ray tracing acceleration structures.
//!
//! Bottom-level structures are built once per mesh when the builder is
//! created and never change. The two top-level structures are rebuilt from
//! scratch every frame:
//!
//! - the **world** TLAS holds every visible instance
//! - the **light** TLAS holds only emissive and forced-emissive instances
//!
//! Instance records are written on the CPU into staging buffers that are
//! partitioned per frame slot, so the records of frame `n + 1` never overwrite
//! what the GPU is still reading for frame `n`:
//!
//! ```text
//! staging:  [ slot 0 | slot 1 | slot 2 ]      each slot = capacity records
//!                        │
//!                        ├─ copy ──────────► InstanceData (device)
//!                        └─ build ─────────► world TLAS / light TLAS
//! ```

mod instance;

pub use instance::{
    FLAG_FIRST_BIT, INSTANCE_INDEX_LIMIT, InstanceData, InstanceFlag, InstanceId,
    TlasInstanceDesc, TlasInstanceFlags, pack_unorm, packed_material_color,
};

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use rtframe_core::math::{DVec3, inverse_f64, to_rows_3x4};
use rtframe_core::scene::{Material, Scene};

use crate::backend::{
    AccelerationStructureDescriptor, AccelerationStructureKind, Command, CommandStream,
    SubmitBatch,
};
use crate::error::{GraphicsError, GraphicsResult};
use crate::resources::{AccelerationStructureId, BufferId, ResourceRegistry};
use crate::transition::{BufferTransitionRequest, TransitionTracker, record_transitions};
use crate::types::{AccessBits, BufferDescriptor, BufferUsage};

/// Seed the classification generator is reset to at the start of every
/// top-level rebuild. Forced-emissive selection is reproducible frame to frame.
pub const CLASSIFICATION_SEED: u64 = 105361;

/// Random draws above this value promote an animated instance to a light.
pub const FORCED_EMISSION_THRESHOLD: f32 = 0.66;

const INSTANCE_DATA_SIZE: u64 = std::mem::size_of::<InstanceData>() as u64;
const TLAS_INSTANCE_SIZE: u64 = std::mem::size_of::<TlasInstanceDesc>() as u64;
const VERTEX_SIZE: u64 = std::mem::size_of::<[f32; 3]>() as u64;

/// Per-frame inputs of a top-level rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TopLevelParams {
    /// Emissive materials emit light; otherwise they are treated as opaque.
    pub emission: bool,
    /// Randomly promote animated instances to light sources.
    pub emissive_objects: bool,
    /// Number of animated pool instances to include. Zero hides the pool.
    pub animated_instances: usize,
}

/// Result of one top-level rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TlasCounts {
    /// Instances written into the world TLAS.
    pub world: u32,
    /// Instances written into the light TLAS. Never exceeds `world`.
    pub light: u32,
    /// Whether any instance was classified as transparent.
    pub has_transparent: bool,
}

/// Check that the largest possible instance population fits both the packed
/// instance id and the device's TLAS limit.
///
/// Returns the TLAS capacity to allocate.
pub fn validate_capacity(
    static_instances: usize,
    animated_max: usize,
    max_tlas_instances: u32,
) -> GraphicsResult<u32> {
    let requested = static_instances + animated_max;
    let capacity = INSTANCE_INDEX_LIMIT.min(max_tlas_instances) as usize;
    if requested > capacity {
        return Err(GraphicsError::InstanceCapacityExceeded {
            requested,
            capacity,
        });
    }
    Ok(requested as u32)
}

/// Classify one instance.
///
/// The generator is only advanced for animated, non-emissive instances while
/// `emissive_objects` is enabled.
pub fn classify(
    material: &Material,
    animated: bool,
    params: &TopLevelParams,
    rng: &mut SmallRng,
) -> InstanceFlag {
    if material.is_emissive() {
        if params.emission {
            InstanceFlag::Emissive
        } else {
            InstanceFlag::Opaque
        }
    } else if params.emissive_objects
        && animated
        && rng.r#gen::<f32>() > FORCED_EMISSION_THRESHOLD
    {
        if params.emission {
            InstanceFlag::ForcedEmissive
        } else {
            InstanceFlag::Opaque
        }
    } else if material.is_transparent() {
        InstanceFlag::Transparent
    } else {
        InstanceFlag::Opaque
    }
}

/// Owner of all acceleration structures and their staging memory.
#[derive(Debug)]
pub struct AccelerationStructureBuilder {
    /// One bottom-level structure per mesh, indexed by mesh index.
    blas: Vec<AccelerationStructureId>,
    world_tlas: AccelerationStructureId,
    light_tlas: AccelerationStructureId,
    world_scratch: BufferId,
    light_scratch: BufferId,
    instance_data: BufferId,
    instance_data_staging: BufferId,
    world_staging: BufferId,
    light_staging: BufferId,
    capacity: u32,
    slots: usize,
}

impl AccelerationStructureBuilder {
    /// Build every BLAS of `scene` and allocate both TLASes plus their
    /// per-slot staging buffers.
    ///
    /// The scene's animated pool must already exist: its size is part of
    /// the TLAS capacity.
    pub fn new(
        registry: &mut ResourceRegistry,
        tracker: &mut TransitionTracker,
        scene: &Scene,
        slots: usize,
    ) -> GraphicsResult<Self> {
        let capabilities = registry.backend().capabilities();
        if !capabilities.ray_tracing {
            return Err(GraphicsError::FeatureNotSupported(
                "ray tracing acceleration structures".into(),
            ));
        }
        if slots == 0 {
            return Err(GraphicsError::InvalidParameter(
                "at least one frame slot is required".into(),
            ));
        }

        let static_instances = scene.renderable_instance_count() - scene.animated_instance_count;
        let capacity = validate_capacity(
            static_instances,
            scene.animated_instance_count,
            capabilities.max_tlas_instances,
        )?;

        let mut blas = Vec::with_capacity(scene.meshes.len());
        for mesh_index in 0..scene.meshes.len() {
            blas.push(Self::build_bottom_level(registry, scene, mesh_index)?);
        }

        let records = capacity.max(1) as u64;
        let (world_tlas, world_scratch) = Self::create_top_level(registry, "World", capacity)?;
        let (light_tlas, light_scratch) = Self::create_top_level(registry, "Light", capacity)?;

        let instance_data = registry.create_buffer(
            BufferDescriptor::new(
                records * INSTANCE_DATA_SIZE,
                BufferUsage::STORAGE | BufferUsage::COPY_DST,
            )
            .with_label("InstanceData"),
        )?;
        tracker.register_buffer(instance_data, AccessBits::SHADER_RESOURCE);

        let instance_data_staging = registry.create_buffer(
            BufferDescriptor::new(
                records * INSTANCE_DATA_SIZE * slots as u64,
                BufferUsage::HOST_WRITE | BufferUsage::COPY_SRC,
            )
            .with_label("InstanceDataStaging"),
        )?;
        let tlas_staging_size = records * TLAS_INSTANCE_SIZE * slots as u64;
        let world_staging = registry.create_buffer(
            BufferDescriptor::new(
                tlas_staging_size,
                BufferUsage::HOST_WRITE | BufferUsage::ACCELERATION_STRUCTURE_INPUT,
            )
            .with_label("WorldTlasDataStaging"),
        )?;
        let light_staging = registry.create_buffer(
            BufferDescriptor::new(
                tlas_staging_size,
                BufferUsage::HOST_WRITE | BufferUsage::ACCELERATION_STRUCTURE_INPUT,
            )
            .with_label("LightTlasDataStaging"),
        )?;

        log::info!(
            "Acceleration structures: {} BLAS, TLAS capacity {} instances, {} slots",
            blas.len(),
            capacity,
            slots
        );

        Ok(Self {
            blas,
            world_tlas,
            light_tlas,
            world_scratch,
            light_scratch,
            instance_data,
            instance_data_staging,
            world_staging,
            light_staging,
            capacity,
            slots,
        })
    }

    fn create_top_level(
        registry: &mut ResourceRegistry,
        name: &str,
        capacity: u32,
    ) -> GraphicsResult<(AccelerationStructureId, BufferId)> {
        let descriptor = AccelerationStructureDescriptor::new(AccelerationStructureKind::TopLevel {
            max_instances: capacity,
        })
        .with_label(format!("{name}Tlas"));
        let scratch_size = registry.backend().scratch_size(&descriptor);

        let tlas = registry.create_acceleration_structure(descriptor)?;
        let scratch = registry.create_buffer(
            BufferDescriptor::new(scratch_size, BufferUsage::STORAGE | BufferUsage::SCRATCH)
                .with_label(format!("{name}Scratch")),
        )?;
        Ok((tlas, scratch))
    }

    /// Build the immutable BLAS of one mesh.
    ///
    /// Vertices and indices go through a temporary upload buffer; the build
    /// is submitted on its own and waited for before the temporary and
    /// scratch buffers are released.
    pub fn build_bottom_level(
        registry: &mut ResourceRegistry,
        scene: &Scene,
        mesh_index: usize,
    ) -> GraphicsResult<AccelerationStructureId> {
        let mesh = scene.meshes.get(mesh_index).ok_or_else(|| {
            GraphicsError::InvalidParameter(format!("mesh {mesh_index} does not exist"))
        })?;
        let vertices = scene.positions.get(mesh.vertex_range()).ok_or_else(|| {
            GraphicsError::InvalidParameter(format!("mesh {mesh_index} vertex range out of bounds"))
        })?;
        let indices = scene.indices.get(mesh.index_range()).ok_or_else(|| {
            GraphicsError::InvalidParameter(format!("mesh {mesh_index} index range out of bounds"))
        })?;

        let vertex_bytes: &[u8] = bytemuck::cast_slice(vertices);
        let index_bytes: &[u8] = bytemuck::cast_slice(indices);
        let index_offset = vertices.len() as u64 * VERTEX_SIZE;

        let upload = registry.create_buffer(
            BufferDescriptor::new(
                (vertex_bytes.len() + index_bytes.len()) as u64,
                BufferUsage::HOST_WRITE | BufferUsage::ACCELERATION_STRUCTURE_INPUT,
            )
            .with_label("BlasUpload"),
        )?;
        registry.write_buffer(upload, 0, vertex_bytes)?;
        registry.write_buffer(upload, index_offset, index_bytes)?;

        let descriptor =
            AccelerationStructureDescriptor::new(AccelerationStructureKind::BottomLevel {
                vertex_count: mesh.vertex_count,
                index_count: mesh.index_count,
            })
            .with_label(format!("Blas{mesh_index}"));
        let scratch_size = registry.backend().scratch_size(&descriptor);
        let blas = registry.create_acceleration_structure(descriptor)?;
        let scratch = registry.create_buffer(
            BufferDescriptor::new(scratch_size, BufferUsage::STORAGE | BufferUsage::SCRATCH)
                .with_label("BlasScratch"),
        )?;

        let upload_handle = registry.buffer(upload)?.handle;
        let mut stream = CommandStream::new("blas");
        stream.push(Command::BuildBottomLevel {
            target: registry.acceleration_structure(blas)?.handle,
            vertex_buffer: upload_handle,
            vertex_count: mesh.vertex_count,
            index_buffer: upload_handle,
            index_offset,
            index_count: mesh.index_count,
            scratch: registry.buffer(scratch)?.handle,
        });

        let backend = registry.backend().clone();
        backend.submit(SubmitBatch {
            streams: vec![&stream],
            ..Default::default()
        })?;
        backend.wait_idle()?;

        registry.destroy_buffer(scratch)?;
        registry.destroy_buffer(upload)?;

        log::trace!(
            "BLAS {}: {} vertices, {} triangles",
            mesh_index,
            mesh.vertex_count,
            mesh.index_count / 3
        );
        Ok(blas)
    }

    /// Rewrite both TLASes for the current frame.
    ///
    /// Writes this frame's records into the `slot` staging region, stores
    /// every visited instance's current transform as its previous one, and
    /// records into `stream`: instance-data buffer to copy destination,
    /// staging → device copy, world TLAS build, light TLAS build.
    #[allow(clippy::too_many_arguments)]
    pub fn rebuild_top_level(
        &self,
        registry: &ResourceRegistry,
        tracker: &mut TransitionTracker,
        stream: &mut CommandStream,
        scene: &mut Scene,
        params: &TopLevelParams,
        origin: &DVec3,
        slot: usize,
    ) -> GraphicsResult<TlasCounts> {
        if slot >= self.slots {
            return Err(GraphicsError::InvalidParameter(format!(
                "frame slot {slot} out of range ({} slots)",
                self.slots
            )));
        }

        let first = scene.first_renderable_instance();
        let static_end = scene.static_instance_end();
        let end = static_end + params.animated_instances.min(scene.animated_instance_count);

        let Scene {
            meshes,
            materials,
            instances,
            ..
        } = scene;

        let mut rng = SmallRng::seed_from_u64(CLASSIFICATION_SEED);
        let mut instance_data = Vec::with_capacity(end - first);
        let mut world = Vec::with_capacity(end - first);
        let mut light = Vec::new();
        let mut has_transparent = false;

        for (index, instance) in instances.iter_mut().enumerate().take(end).skip(first) {
            let material = materials
                .get(instance.material_index as usize)
                .ok_or_else(|| {
                    GraphicsError::InvalidParameter(format!(
                        "instance {index} references missing material {}",
                        instance.material_index
                    ))
                })?;
            if material.is_off() {
                continue;
            }
            let mesh = meshes.get(instance.mesh_index as usize).ok_or_else(|| {
                GraphicsError::InvalidParameter(format!(
                    "instance {index} references missing mesh {}",
                    instance.mesh_index
                ))
            })?;
            let blas = self.blas.get(instance.mesh_index as usize).ok_or_else(|| {
                GraphicsError::Internal(format!("no BLAS for mesh {}", instance.mesh_index))
            })?;

            let object_to_world = instance.object_to_world(origin);
            let object_to_world_prev = instance.object_to_world_prev(origin);
            instance.store_previous();

            let Some(world_to_object) = inverse_f64(&object_to_world) else {
                log::warn!("Instance {index} has a singular transform, skipped");
                continue;
            };
            let world_to_world_prev = object_to_world_prev * world_to_object;

            let flag = classify(material, index >= static_end, params, &mut rng);
            has_transparent |= flag == InstanceFlag::Transparent;

            let id = InstanceId::new(world.len() as u32, flag).pack()?;
            let rows = to_rows_3x4(&object_to_world);

            instance_data.push(InstanceData::new(
                rows,
                to_rows_3x4(&world_to_world_prev),
                mesh.base_primitive_id(),
                instance.material_index,
                packed_material_color(material),
            ));

            let mut flags = TlasInstanceFlags::TRIANGLE_CULL_DISABLE;
            if material.is_opaque() {
                flags |= TlasInstanceFlags::FORCE_OPAQUE;
            }
            let desc = TlasInstanceDesc::new(
                rows,
                id,
                flag.bits() as u8,
                0,
                flags,
                registry.acceleration_structure(*blas)?.address,
            );
            if flag.is_light() {
                light.push(desc);
            }
            world.push(desc);
        }

        let instance_region = self.capacity.max(1) as u64 * INSTANCE_DATA_SIZE;
        let tlas_region = self.capacity.max(1) as u64 * TLAS_INSTANCE_SIZE;
        let instance_offset = instance_region * slot as u64;
        let tlas_offset = tlas_region * slot as u64;

        registry.write_buffer(
            self.instance_data_staging,
            instance_offset,
            bytemuck::cast_slice(&instance_data),
        )?;
        registry.write_buffer(self.world_staging, tlas_offset, bytemuck::cast_slice(&world))?;
        registry.write_buffer(self.light_staging, tlas_offset, bytemuck::cast_slice(&light))?;

        record_transitions(
            stream,
            tracker,
            registry,
            &[],
            &[BufferTransitionRequest::new(
                self.instance_data,
                AccessBits::COPY_DESTINATION,
            )],
        )?;
        stream.copy_buffer(
            registry.buffer(self.instance_data_staging)?.handle,
            instance_offset,
            registry.buffer(self.instance_data)?.handle,
            0,
            instance_region,
        );
        stream.push(Command::BuildTopLevel {
            target: registry.acceleration_structure(self.world_tlas)?.handle,
            instance_buffer: registry.buffer(self.world_staging)?.handle,
            instance_offset: tlas_offset,
            instance_count: world.len() as u32,
            scratch: registry.buffer(self.world_scratch)?.handle,
        });
        stream.push(Command::BuildTopLevel {
            target: registry.acceleration_structure(self.light_tlas)?.handle,
            instance_buffer: registry.buffer(self.light_staging)?.handle,
            instance_offset: tlas_offset,
            instance_count: light.len() as u32,
            scratch: registry.buffer(self.light_scratch)?.handle,
        });

        let counts = TlasCounts {
            world: world.len() as u32,
            light: light.len() as u32,
            has_transparent,
        };
        log::trace!(
            "TLAS slot {}: {} world, {} light instances",
            slot,
            counts.world,
            counts.light
        );
        Ok(counts)
    }

    /// BLAS of a mesh.
    pub fn blas(&self, mesh_index: usize) -> Option<AccelerationStructureId> {
        self.blas.get(mesh_index).copied()
    }

    pub fn world_tlas(&self) -> AccelerationStructureId {
        self.world_tlas
    }

    pub fn light_tlas(&self) -> AccelerationStructureId {
        self.light_tlas
    }

    /// Device-local per-instance data read by the ray tracing pass.
    pub fn instance_data(&self) -> BufferId {
        self.instance_data
    }

    pub fn instance_data_staging(&self) -> BufferId {
        self.instance_data_staging
    }

    pub fn world_staging(&self) -> BufferId {
        self.world_staging
    }

    pub fn light_staging(&self) -> BufferId {
        self.light_staging
    }

    /// Maximum number of instances either TLAS can hold.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyBackend;
    use rtframe_core::math::Mat4;
    use rtframe_core::scene::{AlphaMode, Instance, generators};
    use std::sync::Arc;

    struct Fixture {
        backend: Arc<DummyBackend>,
        registry: ResourceRegistry,
        tracker: TransitionTracker,
        scene: Scene,
    }

    /// Opaque, emissive, transparent, off; followed by 4 "animated" opaque.
    fn fixture() -> Fixture {
        let mut scene = Scene::new();
        let cube = generators::add_cube(&mut scene, 0.5);
        let opaque = scene.add_material(Material::DEFAULT);
        let emissive = scene.add_material(Material::DEFAULT.with_emission(true));
        let glass = scene.add_material(Material::DEFAULT.with_alpha_mode(AlphaMode::Transparent));
        let off = scene.add_material(Material::DEFAULT.with_alpha_mode(AlphaMode::Off));

        for (i, material) in [opaque, emissive, glass, off].into_iter().enumerate() {
            scene.add_instance(Instance::new(
                cube,
                material,
                DVec3::new(i as f64 * 3.0, 0.0, 0.0),
                Mat4::identity(),
            ));
        }
        for i in 0..4 {
            scene.instances.push(Instance::new(
                cube,
                opaque,
                DVec3::new(0.0, i as f64 * 3.0, 0.0),
                Mat4::identity(),
            ));
        }
        scene.animated_instance_count = 4;

        let backend = Arc::new(DummyBackend::new());
        Fixture {
            registry: ResourceRegistry::new(backend.clone()),
            backend,
            tracker: TransitionTracker::new(),
            scene,
        }
    }

    fn rebuild(
        f: &mut Fixture,
        builder: &AccelerationStructureBuilder,
        params: &TopLevelParams,
        slot: usize,
    ) -> (TlasCounts, CommandStream) {
        let mut stream = CommandStream::new("main");
        let counts = builder
            .rebuild_top_level(
                &f.registry,
                &mut f.tracker,
                &mut stream,
                &mut f.scene,
                params,
                &DVec3::zeros(),
                slot,
            )
            .unwrap();
        (counts, stream)
    }

    #[test]
    fn test_validate_capacity() {
        assert_eq!(validate_capacity(800, 512, 1 << 24).unwrap(), 1312);
        assert!(matches!(
            validate_capacity(1 << 20, 1, 1 << 24),
            Err(GraphicsError::InstanceCapacityExceeded {
                requested,
                capacity: 1_048_576
            }) if requested == (1 << 20) + 1
        ));
        assert!(validate_capacity(10, 10, 16).is_err());
    }

    #[test]
    fn test_blas_build_releases_temporaries() {
        let mut f = fixture();
        let builder =
            AccelerationStructureBuilder::new(&mut f.registry, &mut f.tracker, &f.scene, 2)
                .unwrap();
        assert!(builder.blas(0).is_some());

        let submissions = f.backend.submissions();
        assert_eq!(submissions.len(), 1);
        assert!(matches!(
            submissions[0].commands[0],
            Command::BuildBottomLevel {
                vertex_count: 8,
                index_count: 36,
                index_offset: 96,
                ..
            }
        ));
        // 1 BLAS + 2 TLAS + 2 scratch + 4 buffers; upload and BLAS scratch are gone.
        assert_eq!(f.backend.live_resource_count(), 9);
    }

    #[test]
    fn test_rebuild_counts_and_classification() {
        let mut f = fixture();
        let builder =
            AccelerationStructureBuilder::new(&mut f.registry, &mut f.tracker, &f.scene, 2)
                .unwrap();

        let params = TopLevelParams {
            emission: true,
            emissive_objects: false,
            animated_instances: 2,
        };
        let (counts, _) = rebuild(&mut f, &builder, &params, 0);

        // 3 visible static (one is off) + 2 animated.
        assert_eq!(counts.world, 5);
        assert_eq!(counts.light, 1);
        assert!(counts.has_transparent);
    }

    #[test]
    fn test_emission_disabled_demotes_to_opaque() {
        let mut f = fixture();
        let builder =
            AccelerationStructureBuilder::new(&mut f.registry, &mut f.tracker, &f.scene, 1)
                .unwrap();
        let params = TopLevelParams {
            emission: false,
            emissive_objects: true,
            animated_instances: 4,
        };
        let (counts, _) = rebuild(&mut f, &builder, &params, 0);
        assert_eq!(counts.light, 0);
        assert_eq!(counts.world, 7);
    }

    #[test]
    fn test_rebuild_records_commands_in_order() {
        let mut f = fixture();
        let builder =
            AccelerationStructureBuilder::new(&mut f.registry, &mut f.tracker, &f.scene, 2)
                .unwrap();
        let (counts, stream) = rebuild(&mut f, &builder, &TopLevelParams::default(), 1);

        let commands = stream.commands();
        assert_eq!(commands.len(), 4);
        assert!(matches!(&commands[0], Command::Barrier { buffers, .. }
            if buffers[0].before == AccessBits::SHADER_RESOURCE
                && buffers[0].after == AccessBits::COPY_DESTINATION));
        assert!(matches!(commands[1], Command::CopyBuffer { dst_offset: 0, .. }));
        let tlas_region = builder.capacity() as u64 * TLAS_INSTANCE_SIZE;
        assert!(matches!(commands[2], Command::BuildTopLevel { instance_offset, instance_count, .. }
            if instance_offset == tlas_region && instance_count == counts.world));
        assert!(matches!(commands[3], Command::BuildTopLevel { instance_count: 0, .. }));
        assert_eq!(
            f.tracker.buffer_state(builder.instance_data()),
            Some(AccessBits::COPY_DESTINATION)
        );
    }

    #[test]
    fn test_staging_records_round_trip() {
        let mut f = fixture();
        let builder =
            AccelerationStructureBuilder::new(&mut f.registry, &mut f.tracker, &f.scene, 2)
                .unwrap();
        let params = TopLevelParams {
            emission: true,
            ..Default::default()
        };
        let (counts, _) = rebuild(&mut f, &builder, &params, 1);

        let staging = f.registry.buffer(builder.world_staging()).unwrap().handle;
        let offset = builder.capacity() as u64 * TLAS_INSTANCE_SIZE;
        let bytes = f
            .backend
            .read_buffer(staging, offset, counts.world as u64 * TLAS_INSTANCE_SIZE);
        let records: Vec<TlasInstanceDesc> = bytes
            .chunks_exact(TLAS_INSTANCE_SIZE as usize)
            .map(bytemuck::pod_read_unaligned)
            .collect();

        for (i, record) in records.iter().enumerate() {
            assert_eq!(record.custom_index() & (INSTANCE_INDEX_LIMIT - 1), i as u32);
        }
        assert_eq!(records[1].mask(), InstanceFlag::Emissive.bits() as u8);
        assert_eq!(records[2].mask(), InstanceFlag::Transparent.bits() as u8);
        assert!(!records[2].flags().contains(TlasInstanceFlags::FORCE_OPAQUE));
        assert_eq!(records[2].transform[0][3], 6.0);
    }

    #[test]
    fn test_forced_emission_is_deterministic() {
        let mut f = fixture();
        let builder =
            AccelerationStructureBuilder::new(&mut f.registry, &mut f.tracker, &f.scene, 1)
                .unwrap();
        let params = TopLevelParams {
            emission: true,
            emissive_objects: true,
            animated_instances: 4,
        };

        let (first, _) = rebuild(&mut f, &builder, &params, 0);
        let (second, _) = rebuild(&mut f, &builder, &params, 0);
        assert_eq!(first, second);
        assert!(first.light <= first.world);
        assert!(first.light >= 1);
    }

    #[test]
    fn test_rebuild_stores_previous_transform() {
        let mut f = fixture();
        let builder =
            AccelerationStructureBuilder::new(&mut f.registry, &mut f.tracker, &f.scene, 1)
                .unwrap();
        f.scene.instances[0].position = DVec3::new(10.0, 0.0, 0.0);

        rebuild(&mut f, &builder, &TopLevelParams::default(), 0);

        let instance = &f.scene.instances[0];
        assert_eq!(instance.position_prev, instance.position);
    }

    #[test]
    fn test_motion_delta_translates_by_displacement() {
        let mut f = fixture();
        let builder =
            AccelerationStructureBuilder::new(&mut f.registry, &mut f.tracker, &f.scene, 1)
                .unwrap();
        f.scene.instances[0].position = DVec3::new(1.0, 0.0, 0.0);
        f.scene.instances[0].position_prev = DVec3::new(0.0, 0.0, 0.0);

        rebuild(&mut f, &builder, &TopLevelParams::default(), 0);

        let staging = f
            .registry
            .buffer(builder.instance_data_staging())
            .unwrap()
            .handle;
        let bytes = f.backend.read_buffer(staging, 0, INSTANCE_DATA_SIZE);
        let data: InstanceData = bytemuck::pod_read_unaligned(&bytes);
        assert!((data.world_to_world_prev[0][3] + 1.0).abs() < 1e-6);
        assert_eq!(data.base_primitive_id(), 0);
    }

    #[test]
    fn test_slot_out_of_range() {
        let mut f = fixture();
        let builder =
            AccelerationStructureBuilder::new(&mut f.registry, &mut f.tracker, &f.scene, 2)
                .unwrap();
        let mut stream = CommandStream::new("main");
        let result = builder.rebuild_top_level(
            &f.registry,
            &mut f.tracker,
            &mut stream,
            &mut f.scene,
            &TopLevelParams::default(),
            &DVec3::zeros(),
            2,
        );
        assert!(matches!(result, Err(GraphicsError::InvalidParameter(_))));
    }
}
