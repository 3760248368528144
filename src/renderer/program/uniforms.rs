//! Per-frame and per-draw uniform values.
//!
//! Names match the declarations produced by
//! [`ProgramParameters::derive`](super::ProgramParameters::derive); values the
//! bound program does not reflect are dropped by the cache on upload.

use glam::{Affine3A, Mat3, Mat4, Vec3, Vec4};

use crate::renderer::settings::RendererSettings;
use crate::resources::UniformValue;
use crate::scene::{Camera, Fog, LightKind, LightState};

/// Values shared by every draw of one frame.
#[derive(Debug, Clone, Default)]
pub struct FrameUniforms {
    pub view_matrix: Mat4,
    pub values: Vec<(String, UniformValue)>,
    /// Global clipping planes, already in view space.
    pub clipping_planes: Vec<Vec4>,
}

impl FrameUniforms {
    pub fn build(
        &mut self,
        camera: &Camera,
        settings: &RendererSettings,
        lights: &LightState,
        fog: Option<&Fog>,
    ) {
        self.view_matrix = *camera.view_matrix();
        self.values.clear();

        self.push("view_matrix", self.view_matrix.into());
        self.push("projection_matrix", (*camera.projection_matrix()).into());
        self.push("camera_position", camera.world_position().into());
        self.push("tone_mapping_exposure", settings.tone_mapping_exposure.into());
        self.push("ambient_light_color", lights.ambient.into());

        append_light_uniforms(lights, &mut self.values);

        match fog {
            Some(Fog::Linear { color, near, far }) => {
                self.push("fog_color", (*color).into());
                self.push("fog_near", (*near).into());
                self.push("fog_far", (*far).into());
            }
            Some(Fog::Exp2 { color, density }) => {
                self.push("fog_color", (*color).into());
                self.push("fog_density", (*density).into());
            }
            None => {}
        }

        self.clipping_planes.clear();
        self.clipping_planes.extend(
            settings
                .clipping_planes
                .iter()
                .map(|p| plane_to_view(*p, &self.view_matrix)),
        );
    }

    fn push(&mut self, name: &str, value: UniformValue) {
        self.values.push((name.to_string(), value));
    }
}

/// Transforms a world-space plane `(normal, constant)` into view space.
#[must_use]
pub fn plane_to_view(plane: Vec4, view: &Mat4) -> Vec4 {
    let normal_matrix = Mat3::from_mat4(*view);
    let normal = (normal_matrix * plane.truncate()).normalize_or_zero();
    let point = view.transform_point3(plane.truncate() * -plane.w);
    normal.extend(-point.dot(normal))
}

/// Matrices that depend on the drawn object.
#[must_use]
pub fn object_uniforms(world: &Affine3A, view: &Mat4) -> [(&'static str, UniformValue); 3] {
    let model = Mat4::from(*world);
    let model_view = *view * model;
    let normal = Mat3::from_mat4(model_view).inverse().transpose();
    [
        ("model_matrix", model.into()),
        ("model_view_matrix", model_view.into()),
        ("normal_matrix", normal.into()),
    ]
}

/// Flattens the per-kind light arrays into `kind_lights[i].field` values.
pub fn append_light_uniforms(lights: &LightState, out: &mut Vec<(String, UniformValue)>) {
    let (mut dir, mut point, mut spot, mut hemi, mut rect) = (0, 0, 0, 0, 0);

    for entry in &lights.entries {
        let light = &entry.light;
        let color = light.color * light.intensity;
        match light.kind {
            LightKind::Ambient => {}
            LightKind::Directional => {
                let p = format!("directional_lights[{dir}]");
                out.push((format!("{p}.color"), color.into()));
                out.push((format!("{p}.direction"), entry.direction.into()));
                dir += 1;
            }
            LightKind::Point(pl) => {
                let p = format!("point_lights[{point}]");
                out.push((format!("{p}.color"), color.into()));
                out.push((format!("{p}.position"), entry.position.into()));
                out.push((format!("{p}.distance"), pl.distance.into()));
                out.push((format!("{p}.decay"), pl.decay.into()));
                point += 1;
            }
            LightKind::Spot(sl) => {
                let p = format!("spot_lights[{spot}]");
                out.push((format!("{p}.color"), color.into()));
                out.push((format!("{p}.position"), entry.position.into()));
                out.push((format!("{p}.direction"), entry.direction.into()));
                out.push((format!("{p}.distance"), sl.distance.into()));
                out.push((format!("{p}.cone_cos"), sl.angle.cos().into()));
                out.push((
                    format!("{p}.penumbra_cos"),
                    (sl.angle * (1.0 - sl.penumbra)).cos().into(),
                ));
                out.push((format!("{p}.decay"), sl.decay.into()));
                spot += 1;
            }
            LightKind::Hemisphere(hl) => {
                let p = format!("hemisphere_lights[{hemi}]");
                let up = entry.position.try_normalize().unwrap_or(Vec3::Y);
                out.push((format!("{p}.sky_color"), color.into()));
                out.push((format!("{p}.ground_color"), (hl.ground_color * light.intensity).into()));
                out.push((format!("{p}.direction"), (-up).into()));
                hemi += 1;
            }
            LightKind::RectArea(rl) => {
                let p = format!("rect_area_lights[{rect}]");
                out.push((format!("{p}.color"), color.into()));
                out.push((format!("{p}.position"), entry.position.into()));
                out.push((format!("{p}.half_width"), (Vec3::X * rl.width * 0.5).into()));
                out.push((format!("{p}.half_height"), (Vec3::Y * rl.height * 0.5).into()));
                rect += 1;
            }
        }
    }
}
