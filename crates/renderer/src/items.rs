//! Render items, materials, and the N-wide dirty propagation protocol.
//!
//! Constant data lives once per frame resource, so a CPU-side change must
//! be rewritten into *every* ring slot, not just the next one. Items and
//! materials carry a `frames_dirty` counter initialized to
//! [`NUM_FRAME_RESOURCES`]; each per-frame update writes dirty entries
//! into the current frame resource's buffer and decrements the counter.
//! After N updates the change has reached every slot and the counter
//! rests at zero.
//!
//! The update functions write through a sink closure rather than a GPU
//! buffer directly, which keeps the propagation protocol testable.

use glam::{Mat4, Vec3, Vec4};

use crate::NUM_FRAME_RESOURCES;
use crate::constants::{MaterialData, ObjectConstants};

/// Draw-order layer a render item belongs to.
///
/// `Sky` draws before `Opaque` inside the main pass (the sky pipeline uses
/// LESS_EQUAL against the cleared depth, the opaque pipeline EQUAL against
/// the depth pre-laid by the normals pass). `Debug` is populated but only
/// drawn when the debug toggle is on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RenderLayer {
    Opaque,
    Debug,
    Sky,
}

impl RenderLayer {
    /// All layers, in storage order.
    pub const ALL: [RenderLayer; 3] = [RenderLayer::Opaque, RenderLayer::Debug, RenderLayer::Sky];

    /// Index into per-layer arrays.
    pub fn index(self) -> usize {
        match self {
            RenderLayer::Opaque => 0,
            RenderLayer::Debug => 1,
            RenderLayer::Sky => 2,
        }
    }
}

/// One drawable object instance.
#[derive(Clone, Debug)]
pub struct RenderItem {
    /// Object-to-world transform.
    pub world: Mat4,
    /// Texture coordinate transform.
    pub tex_transform: Mat4,
    /// Element index in the per-object constant buffer.
    pub object_index: u32,
    /// Index into the material list.
    pub material_index: u32,
    /// Key of the mesh buffer this item draws from.
    pub mesh: &'static str,
    /// Submesh name inside that mesh buffer.
    pub submesh: &'static str,
    /// Ring slots that still need this item's current constants.
    pub frames_dirty: usize,
}

impl RenderItem {
    /// Creates an item with identity transforms, fully dirty.
    pub fn new(object_index: u32, material_index: u32, mesh: &'static str, submesh: &'static str) -> Self {
        Self {
            world: Mat4::IDENTITY,
            tex_transform: Mat4::IDENTITY,
            object_index,
            material_index,
            mesh,
            submesh,
            frames_dirty: NUM_FRAME_RESOURCES,
        }
    }

    /// Replaces the world transform and marks every ring slot stale.
    pub fn set_world(&mut self, world: Mat4) {
        self.world = world;
        self.frames_dirty = NUM_FRAME_RESOURCES;
    }
}

/// A material: shading parameters plus texture slots in the slot table.
#[derive(Clone, Debug)]
pub struct Material {
    pub name: &'static str,
    /// Element index in the material storage buffer.
    pub buffer_index: u32,
    /// Slot of the diffuse map.
    pub diffuse_slot: u32,
    /// Slot of the normal map.
    pub normal_slot: u32,
    pub diffuse_albedo: Vec4,
    pub fresnel_r0: Vec3,
    pub roughness: f32,
    pub transform: Mat4,
    /// Ring slots that still need this material's current data.
    pub frames_dirty: usize,
}

impl Material {
    /// Creates a material, fully dirty so the first N updates upload it.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: &'static str,
        buffer_index: u32,
        diffuse_slot: u32,
        normal_slot: u32,
        diffuse_albedo: Vec4,
        fresnel_r0: Vec3,
        roughness: f32,
    ) -> Self {
        Self {
            name,
            buffer_index,
            diffuse_slot,
            normal_slot,
            diffuse_albedo,
            fresnel_r0,
            roughness,
            transform: Mat4::IDENTITY,
            frames_dirty: NUM_FRAME_RESOURCES,
        }
    }

    /// Marks every ring slot stale after a parameter change.
    pub fn mark_dirty(&mut self) {
        self.frames_dirty = NUM_FRAME_RESOURCES;
    }
}

/// Writes every dirty item's constants into the current frame resource.
///
/// `write` receives the object buffer element index and the constants to
/// store there. Each successful write decrements the item's dirty counter
/// by exactly one; a failed write leaves it dirty for the next attempt.
pub fn update_object_constants<E, F>(
    items: &mut [RenderItem],
    materials: &[Material],
    mut write: F,
) -> Result<(), E>
where
    F: FnMut(u32, &ObjectConstants) -> Result<(), E>,
{
    for item in items.iter_mut() {
        if item.frames_dirty > 0 {
            let constants = ObjectConstants::new(
                item.world,
                item.tex_transform,
                materials[item.material_index as usize].buffer_index,
            );
            write(item.object_index, &constants)?;
            item.frames_dirty -= 1;
        }
    }
    Ok(())
}

/// Writes every dirty material into the current frame resource's material
/// buffer. Same protocol as [`update_object_constants`].
pub fn update_material_buffer<E, F>(materials: &mut [Material], mut write: F) -> Result<(), E>
where
    F: FnMut(u32, &MaterialData) -> Result<(), E>,
{
    for material in materials.iter_mut() {
        if material.frames_dirty > 0 {
            let data = MaterialData {
                diffuse_albedo: material.diffuse_albedo,
                fresnel_r0: material.fresnel_r0,
                roughness: material.roughness,
                mat_transform: material.transform,
                diffuse_map_index: material.diffuse_slot,
                normal_map_index: material.normal_slot,
                _pad: [0; 2],
            };
            write(material.buffer_index, &data)?;
            material.frames_dirty -= 1;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_material() -> Material {
        Material::new(
            "bricks",
            0,
            0,
            1,
            Vec4::ONE,
            Vec3::splat(0.1),
            0.3,
        )
    }

    #[test]
    fn test_new_item_is_dirty_for_every_ring_slot() {
        let item = RenderItem::new(0, 0, "shapes", "box");
        assert_eq!(item.frames_dirty, NUM_FRAME_RESOURCES);
    }

    fn run_update(items: &mut [RenderItem], materials: &[Material]) -> Vec<(u32, ObjectConstants)> {
        let mut writes = Vec::new();
        update_object_constants(items, materials, |index, constants| {
            writes.push((index, *constants));
            Ok::<(), ()>(())
        })
        .unwrap();
        writes
    }

    #[test]
    fn test_dirty_propagates_into_all_frame_resources() {
        let materials = vec![test_material()];
        let mut items = vec![RenderItem::new(0, 0, "shapes", "box")];
        items[0].set_world(Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0)));

        // Simulate N frame updates, each writing into its own slot.
        // Every simulated frame must get exactly one write with the new
        // world transform.
        for _ in 0..NUM_FRAME_RESOURCES {
            let writes = run_update(&mut items, &materials);
            assert_eq!(writes.len(), 1);
            assert_eq!(writes[0].0, 0);
            assert_eq!(
                writes[0].1.world,
                Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0))
            );
        }
        assert_eq!(items[0].frames_dirty, 0);

        // A fourth update writes nothing.
        assert!(run_update(&mut items, &materials).is_empty());
    }

    #[test]
    fn test_each_update_decrements_by_exactly_one() {
        let materials = vec![test_material()];
        let mut items = vec![RenderItem::new(0, 0, "shapes", "box")];
        for expected in (0..NUM_FRAME_RESOURCES).rev() {
            run_update(&mut items, &materials);
            assert_eq!(items[0].frames_dirty, expected);
        }
    }

    #[test]
    fn test_set_world_restarts_propagation() {
        let materials = vec![test_material()];
        let mut items = vec![RenderItem::new(0, 0, "shapes", "box")];
        run_update(&mut items, &materials);
        run_update(&mut items, &materials);
        assert_eq!(items[0].frames_dirty, 1);

        items[0].set_world(Mat4::from_rotation_y(0.5));
        assert_eq!(items[0].frames_dirty, NUM_FRAME_RESOURCES);
    }

    #[test]
    fn test_failed_write_leaves_item_dirty() {
        let materials = vec![test_material()];
        let mut items = vec![RenderItem::new(0, 0, "shapes", "box")];
        let result: Result<(), &str> =
            update_object_constants(&mut items, &materials, |_, _| Err("mapped write failed"));
        assert!(result.is_err());
        assert_eq!(items[0].frames_dirty, NUM_FRAME_RESOURCES);
    }

    #[test]
    fn test_only_dirty_items_are_written() {
        let materials = vec![test_material()];
        let mut items = vec![
            RenderItem::new(0, 0, "shapes", "box"),
            RenderItem::new(1, 0, "shapes", "grid"),
        ];
        // Drain both items.
        for _ in 0..NUM_FRAME_RESOURCES {
            run_update(&mut items, &materials);
        }
        // Touch only the second.
        items[1].set_world(Mat4::from_translation(Vec3::X));

        let written: Vec<u32> = run_update(&mut items, &materials)
            .iter()
            .map(|(index, _)| *index)
            .collect();
        assert_eq!(written, vec![1]);
    }

    #[test]
    fn test_material_dirty_propagation() {
        let mut materials = vec![test_material()];
        for _ in 0..NUM_FRAME_RESOURCES {
            let mut writes = 0;
            update_material_buffer(&mut materials, |index, data| {
                assert_eq!(index, 0);
                assert_eq!(data.diffuse_map_index, 0);
                assert_eq!(data.normal_map_index, 1);
                writes += 1;
                Ok::<(), ()>(())
            })
            .unwrap();
            assert_eq!(writes, 1);
        }
        assert_eq!(materials[0].frames_dirty, 0);

        materials[0].roughness = 0.9;
        materials[0].mark_dirty();
        assert_eq!(materials[0].frames_dirty, NUM_FRAME_RESOURCES);
    }

    #[test]
    fn test_object_constants_carry_material_buffer_index() {
        let mut materials = vec![test_material()];
        materials[0].buffer_index = 7;
        let mut items = vec![RenderItem::new(0, 0, "shapes", "box")];
        let writes = run_update(&mut items, &materials);
        assert_eq!(writes[0].1.material_index, 7);
    }
}
