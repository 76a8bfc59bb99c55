//! Integration test for resetting the process-wide component type registry.
//!
//! Lives in its own test binary: the registry is shared by every test in a
//! process and a reset would invalidate worlds owned by concurrent tests.

use tessera_core::ecs::{
    component_type_id, component_type_info, registered_component_count, reset_type_registry,
    type_registry_epoch,
};
use tessera_core::{Component, World};

struct Mass(f32);
impl Component for Mass {}

struct Charge(f32);
impl Component for Charge {}

#[test]
fn reset_reassigns_ids_from_scratch() {
    let mass = component_type_id::<Mass>();
    let charge = component_type_id::<Charge>();
    assert_ne!(mass, charge);
    assert_eq!(registered_component_count(), 2);
    let epoch = type_registry_epoch();

    {
        let mut world = World::new();
        let e = world.create_entity(true).unwrap();
        world.set(e, Mass(2.0), true).unwrap();
        world.set(e, Charge(-1.0), true).unwrap();
        assert_eq!(world.get::<Mass>(e).unwrap().0, 2.0);
        assert_eq!(world.get::<Charge>(e).unwrap().0, -1.0);
    }

    reset_type_registry();
    assert_eq!(type_registry_epoch(), epoch + 1);
    assert_eq!(registered_component_count(), 0);
    assert!(component_type_info(mass).is_none());

    // First use after the reset gets the first index again
    let charge_again = component_type_id::<Charge>();
    assert_eq!(charge_again.index(), 0);
    assert_eq!(component_type_info(charge_again).unwrap().short_name(), "Charge");

    let mut world = World::new();
    let e = world.create_entity(true).unwrap();
    world.set(e, Charge(3.0), true).unwrap();
    world.set(e, Mass(1.0), true).unwrap();
    assert!(world.has::<Mass>(e).unwrap());
    assert_eq!(world.get_component_types(e).unwrap().len(), 2);
}
