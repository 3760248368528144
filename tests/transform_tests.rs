//! Transform & Hierarchy Tests
//!
//! Tests for:
//! - World matrix propagation (root, chains, lazy staleness)
//! - Reparenting: `add` detaches first, `attach` keeps world transform
//! - Self-parenting and cycle rejection
//! - Traversal order and visibility pruning

use std::f32::consts::FRAC_PI_2;

use glam::{Affine3A, Quat, Vec3};

use strata::StrataError;
use strata::scene::{Node, Scene};

const EPSILON: f32 = 1e-5;

fn approx_vec3(a: Vec3, b: Vec3) -> bool {
    (a - b).abs().max_element() < EPSILON
}

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ============================================================================
// World matrix propagation
// ============================================================================

#[test]
fn three_level_chain_places_point_analytically() {
    init_logger();
    let mut scene = Scene::new();
    let root = scene.create_node("root");
    let a = scene.create_node("a");
    let b = scene.create_node("b");
    scene.add(root, a).unwrap();
    scene.add(a, b).unwrap();

    scene.get_node_mut(root).unwrap().transform.position = Vec3::new(1.0, 0.0, 0.0);
    scene.get_node_mut(a).unwrap().transform.rotation = Quat::from_rotation_y(FRAC_PI_2);
    scene.get_node_mut(b).unwrap().transform.scale = Vec3::splat(2.0);
    scene.update_matrix_world();

    let world = scene.world_matrix(b).unwrap();
    let p = world.transform_point3(Vec3::X);
    assert!(approx_vec3(p, Vec3::new(1.0, 0.0, -2.0)), "got {p}");
}

#[test]
fn world_equals_parent_times_local_for_every_node() {
    let mut scene = Scene::new();
    let root = scene.add_node(Node::new("root").with_position(Vec3::new(0.0, 2.0, 0.0)));
    let mut parent = root;
    for depth in 0..6 {
        for branch in 0..3 {
            let child = scene.create_node(&format!("n{depth}_{branch}"));
            let node = scene.get_node_mut(child).unwrap();
            node.transform.position = Vec3::new(branch as f32, 1.0, -(depth as f32));
            node.transform.rotation = Quat::from_rotation_z(0.3 * branch as f32);
            node.transform.scale = Vec3::splat(1.0 + 0.1 * depth as f32);
            scene.add(parent, child).unwrap();
            if branch == 0 {
                parent = child;
            }
        }
    }
    scene.update_matrix_world();

    for handle in scene.traverse(root) {
        let node = scene.get_node(handle).unwrap();
        let expected = match node.parent() {
            Some(p) => *scene.world_matrix(p).unwrap() * *node.transform.local_matrix(),
            None => *node.transform.local_matrix(),
        };
        assert!(node.world_matrix().abs_diff_eq(expected, 1e-4));
    }
}

#[test]
fn staleness_is_resolved_on_next_pass_only() {
    let mut scene = Scene::new();
    let root = scene.create_node("root");
    let child = scene.create_node("child");
    scene.add(root, child).unwrap();
    scene.update_matrix_world();

    scene.get_node_mut(root).unwrap().transform.position = Vec3::new(0.0, 5.0, 0.0);
    assert!(approx_vec3(scene.get_node(child).unwrap().world_position(), Vec3::ZERO));

    scene.update_matrix_world();
    assert!(approx_vec3(
        scene.get_node(child).unwrap().world_position(),
        Vec3::new(0.0, 5.0, 0.0)
    ));
}

#[test]
fn update_world_matrix_with_parents_refreshes_chain() {
    let mut scene = Scene::new();
    let root = scene.create_node("root");
    let child = scene.create_node("child");
    scene.add(root, child).unwrap();
    scene.get_node_mut(root).unwrap().transform.position = Vec3::X;
    scene.get_node_mut(child).unwrap().transform.position = Vec3::Y;

    scene.update_world_matrix(child, true, false);
    assert!(approx_vec3(
        scene.get_node(child).unwrap().world_position(),
        Vec3::new(1.0, 1.0, 0.0)
    ));
}

#[test]
fn set_local_transform_normalizes_rotation() {
    let mut scene = Scene::new();
    let node = scene.create_node("n");
    scene
        .get_node_mut(node)
        .unwrap()
        .transform
        .set_local_transform(Vec3::ZERO, Quat::from_xyzw(0.0, 2.0, 0.0, 0.0), Vec3::ONE);
    let rotation = scene.get_node(node).unwrap().transform.rotation;
    assert!((rotation.length() - 1.0).abs() < EPSILON);
}

#[test]
fn manual_local_matrix_survives_propagation() {
    let mut scene = Scene::new();
    let node = scene.create_node("n");
    let m = Affine3A::from_translation(Vec3::new(3.0, 0.0, 0.0));
    {
        let transform = &mut scene.get_node_mut(node).unwrap().transform;
        transform.matrix_auto_update = false;
        transform.set_local_matrix(m);
        transform.position = Vec3::new(-9.0, 0.0, 0.0);
    }
    scene.update_matrix_world();
    assert!(approx_vec3(
        scene.get_node(node).unwrap().world_position(),
        Vec3::new(3.0, 0.0, 0.0)
    ));
}

// ============================================================================
// Reparenting
// ============================================================================

#[test]
fn add_detaches_from_previous_parent() {
    let mut scene = Scene::new();
    let old_parent = scene.create_node("old");
    let new_parent = scene.create_node("new");
    let child = scene.create_node("child");
    scene.add(old_parent, child).unwrap();
    scene.add(new_parent, child).unwrap();

    assert_eq!(scene.get_node(child).unwrap().parent(), Some(new_parent));
    assert!(!scene.get_node(old_parent).unwrap().children().contains(&child));
    assert_eq!(scene.get_node(new_parent).unwrap().children(), &[child]);
    assert!(!scene.roots().contains(&child));
}

#[test]
fn attach_keeps_world_transform() {
    let mut scene = Scene::new();
    let parent = scene.create_node("parent");
    let child = scene.create_node("child");
    scene.get_node_mut(parent).unwrap().transform.position = Vec3::new(4.0, 0.0, 0.0);
    scene.get_node_mut(parent).unwrap().transform.rotation = Quat::from_rotation_y(FRAC_PI_2);
    scene.get_node_mut(child).unwrap().transform.position = Vec3::new(0.0, 1.0, 2.0);
    scene.update_matrix_world();

    scene.attach(parent, child).unwrap();
    scene.update_matrix_world();
    assert!(approx_vec3(
        scene.get_node(child).unwrap().world_position(),
        Vec3::new(0.0, 1.0, 2.0)
    ));
}

#[test]
fn attach_moves_existing_children_of_a_moved_parent() {
    let mut scene = Scene::new();
    let parent = scene.create_node("parent");
    let child = scene.create_node("child");
    let other = scene.create_node("other");
    scene.add(parent, child).unwrap();
    scene.update_matrix_world();

    scene.get_node_mut(parent).unwrap().transform.position = Vec3::new(5.0, 0.0, 0.0);
    scene.attach(parent, other).unwrap();
    scene.update_matrix_world();

    assert!(approx_vec3(
        scene.get_node(child).unwrap().world_position(),
        Vec3::new(5.0, 0.0, 0.0)
    ));
    assert!(approx_vec3(scene.get_node(other).unwrap().world_position(), Vec3::ZERO));
}

#[test]
fn single_node_update_still_propagates_on_next_pass() {
    let mut scene = Scene::new();
    let parent = scene.create_node("parent");
    let child = scene.create_node("child");
    scene.add(parent, child).unwrap();
    scene.update_matrix_world();

    scene.get_node_mut(parent).unwrap().transform.position = Vec3::new(5.0, 0.0, 0.0);
    scene.update_world_matrix(parent, false, false);
    scene.update_matrix_world();

    assert!(approx_vec3(
        scene.get_node(child).unwrap().world_position(),
        Vec3::new(5.0, 0.0, 0.0)
    ));
}

#[test]
fn self_parenting_is_rejected_without_mutation() {
    init_logger();
    let mut scene = Scene::new();
    let node = scene.create_node("n");
    assert_eq!(scene.add(node, node), Err(StrataError::SelfParenting));
    assert!(scene.roots().contains(&node));
    assert_eq!(scene.get_node(node).unwrap().parent(), None);
}

#[test]
fn cycles_are_rejected() {
    let mut scene = Scene::new();
    let a = scene.create_node("a");
    let b = scene.create_node("b");
    scene.add(a, b).unwrap();
    assert!(matches!(scene.add(b, a), Err(StrataError::InvalidHierarchy(_))));
    assert_eq!(scene.get_node(b).unwrap().parent(), Some(a));
}

#[test]
fn remove_only_detaches() {
    let mut scene = Scene::new();
    let parent = scene.create_node("parent");
    let child = scene.create_node("child");
    scene.add(parent, child).unwrap();

    assert!(scene.remove(parent, child));
    assert!(!scene.remove(parent, child));
    assert!(scene.contains(child));
    assert!(!scene.is_attached(child));
}

// ============================================================================
// Traversal
// ============================================================================

#[test]
fn traversal_is_parent_first_depth_first() {
    let mut scene = Scene::new();
    let root = scene.create_node("root");
    let a = scene.create_node("a");
    let a1 = scene.create_node("a1");
    let b = scene.create_node("b");
    scene.add(root, a).unwrap();
    scene.add(a, a1).unwrap();
    scene.add(root, b).unwrap();

    let order: Vec<_> = scene.traverse(root).collect();
    assert_eq!(order, vec![root, a, a1, b]);

    let ancestors: Vec<_> = scene.traverse_ancestors(a1).collect();
    assert_eq!(ancestors, vec![a, root]);
}

#[test]
fn traverse_visible_prunes_hidden_subtrees() {
    let mut scene = Scene::new();
    let root = scene.create_node("root");
    let hidden = scene.create_node("hidden");
    let below = scene.create_node("below");
    let shown = scene.create_node("shown");
    scene.add(root, hidden).unwrap();
    scene.add(hidden, below).unwrap();
    scene.add(root, shown).unwrap();
    scene.get_node_mut(hidden).unwrap().visible = false;

    let visible: Vec<_> = scene.traverse_visible(root).collect();
    assert_eq!(visible, vec![root, shown]);
    assert_eq!(scene.find_by_name("below"), Some(below));
}
