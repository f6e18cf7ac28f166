use std::borrow::Cow;

use anyhow::{bail, Result};
use wgpu::naga::ShaderStage;

use crate::plan::Pass;

/// Fragment programs compiled at mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Program {
    Scene,
    Tensor,
    Kuwahara,
    Composite,
    /// Alpha-blended confetti canvas drawn over the final frame.
    Overlay,
}

impl Program {
    pub const ALL: [Program; 5] = [
        Program::Scene,
        Program::Tensor,
        Program::Kuwahara,
        Program::Composite,
        Program::Overlay,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Program::Scene => "scene",
            Program::Tensor => "structure tensor",
            Program::Kuwahara => "anisotropic kuwahara",
            Program::Composite => "composition",
            Program::Overlay => "confetti overlay",
        }
    }

    /// Whether the program reads set 1 (input textures and sampler).
    pub fn samples_inputs(self) -> bool {
        !matches!(self, Program::Scene)
    }

    /// Full GLSL source: shared uniform block, optional input bindings, body.
    pub fn fragment_source(self) -> String {
        let body = match self {
            Program::Scene => SCENE_FRAGMENT,
            Program::Tensor => TENSOR_FRAGMENT,
            Program::Kuwahara => KUWAHARA_FRAGMENT,
            Program::Composite => COMPOSITE_FRAGMENT,
            Program::Overlay => OVERLAY_FRAGMENT,
        };
        if self.samples_inputs() {
            format!("{PRELUDE}\n{INPUTS}\n{body}")
        } else {
            format!("{PRELUDE}\n{body}")
        }
    }
}

impl From<Pass> for Program {
    fn from(pass: Pass) -> Self {
        match pass {
            Pass::Scene => Program::Scene,
            Pass::Tensor => Program::Tensor,
            Pass::Kuwahara => Program::Kuwahara,
            Pass::Composite => Program::Composite,
        }
    }
}

/// Compiles the static full-screen triangle vertex shader.
pub(crate) fn compile_vertex_shader(device: &wgpu::Device) -> Result<wgpu::ShaderModule> {
    compile(
        device,
        "fullscreen triangle vertex",
        Cow::Borrowed(VERTEX_SHADER_GLSL),
        ShaderStage::Vertex,
    )
}

pub(crate) fn compile_fragment_shader(
    device: &wgpu::Device,
    program: Program,
) -> Result<wgpu::ShaderModule> {
    compile(
        device,
        program.label(),
        Cow::Owned(program.fragment_source()),
        ShaderStage::Fragment,
    )
}

/// Creates a shader module inside a validation error scope so that a broken
/// shader surfaces as an error instead of a device panic.
fn compile(
    device: &wgpu::Device,
    label: &str,
    source: Cow<'static, str>,
    stage: ShaderStage,
) -> Result<wgpu::ShaderModule> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Glsl {
            shader: source,
            stage,
            defines: &[],
        },
    });
    if let Some(err) = pollster::block_on(device.pop_error_scope()) {
        bail!("failed to compile {label} shader: {err}");
    }
    Ok(module)
}

/// Uniform block shared by every fragment program. The layout must match
/// `PassUniforms` in `gpu/uniforms.rs`.
const PRELUDE: &str = r"#version 450
layout(location = 0) out vec4 out_color;

layout(std140, set = 0, binding = 0) uniform PassParams {
    vec4 resolution;
    vec4 pointer;
    float time;
    float radius;
    float alpha;
    float _padding;
} params;

const float PI = 3.14159265;
const float TAU = 6.28318531;
const vec3 LUMA = vec3(0.299, 0.587, 0.114);

// gl_FragCoord has a top-left origin; the passes work bottom-left.
vec2 frag_coord() {
    return vec2(gl_FragCoord.x, params.resolution.y - gl_FragCoord.y);
}
";

/// Input textures for the post-processing passes. Offscreen textures store
/// rows top-down, so bottom-left coordinates are flipped on access.
const INPUTS: &str = r"
layout(set = 1, binding = 0) uniform texture2D primary_texture;
layout(set = 1, binding = 1) uniform texture2D secondary_texture;
layout(set = 1, binding = 2) uniform sampler input_sampler;

vec4 fetch_primary(ivec2 c) {
    ivec2 size = textureSize(sampler2D(primary_texture, input_sampler), 0);
    ivec2 p = clamp(c, ivec2(0), size - ivec2(1));
    return texelFetch(sampler2D(primary_texture, input_sampler), ivec2(p.x, size.y - 1 - p.y), 0);
}

vec4 fetch_secondary(ivec2 c) {
    ivec2 size = textureSize(sampler2D(secondary_texture, input_sampler), 0);
    ivec2 p = clamp(c, ivec2(0), size - ivec2(1));
    return texelFetch(sampler2D(secondary_texture, input_sampler), ivec2(p.x, size.y - 1 - p.y), 0);
}

// Bilinear sample at a bottom-left pixel position, texel centres at +0.5.
vec4 sample_secondary(vec2 p) {
    vec2 uv = vec2(p.x * params.resolution.z, 1.0 - p.y * params.resolution.w);
    return textureLod(sampler2D(secondary_texture, input_sampler), uv, 0.0);
}
";

/// Procedural planet: terrain, ocean, clouds, atmosphere and two lights.
pub const SCENE_FRAGMENT: &str = r"
const float SEED = 0.0;
const float PLANET_RADIUS = 0.9;
const vec3 ROTATION_AXIS = vec3(0.3, 1.0, 0.0);
const float ROTATION_SPEED = 0.2;
const vec3 CAMERA = vec3(0.0, 0.0, -1.0);
const vec3 LAND_COLOR = vec3(0.2, 0.4, 0.0);
const vec3 JUNGLE_COLOR = vec3(0.0, 0.2, 0.0);
const vec3 DESERT_COLOR = vec3(1.0, 0.8, 0.6);
const vec3 SNOW_COLOR = vec3(0.85, 0.85, 0.5);
const float OCEAN_SIZE = 0.57;
const vec3 OCEAN_COLOR = vec3(0.1, 0.15, 0.35);
const vec3 ATMOSPHERE_COLOR = vec3(0.4, 0.6, 1.0);
const float ATMOSPHERE_DENSITY = 0.6;
const vec3 DAWN_COLOR = vec3(1.0, 0.7, 0.0);
const vec3 SUNSET_COLOR = vec3(1.0, 0.1, 0.0);
const vec3 CLOUD_COLOR = vec3(0.8);
const float AMBIENT_LIGHT = 0.2;
const vec3 LIGHT1_POS = vec3(0.0, 0.0, -50.0);
const float LIGHT1_STRENGTH = 0.9;
const vec3 LIGHT2_POS = vec3(8.0, 12.0, 4.0);
const float LIGHT2_STRENGTH = 1.0;

float hash12(vec2 p, float scale) {
    vec2 q = mod(p, vec2(scale));
    q.y += SEED;
    return fract(sin(dot(q, vec2(12.9898, 4.1414))) * 43758.5453);
}

float noise(vec2 p, float scale) {
    vec2 s = p * scale;
    vec2 f = fract(s);
    vec2 i = floor(s);
    return mix(
        mix(hash12(i, scale), hash12(i + vec2(1.0, 0.0), scale), f.x),
        mix(hash12(i + vec2(0.0, 1.0), scale), hash12(i + vec2(1.0, 1.0), scale), f.x),
        f.y);
}

float fbm(vec2 p, float scale, int octaves) {
    float sum = 0.0;
    float norm = 0.0;
    float amplitude = 1.0;
    float s = scale;
    for (int i = 0; i < octaves; i++) {
        sum += amplitude * noise(p, s);
        norm += amplitude;
        amplitude *= 0.6;
        s *= 2.0;
    }
    return sum / norm;
}

float swirly_fbm(vec2 p, float scale, int octaves, float time) {
    vec2 q = p - vec2(time * 0.004);
    float sum = 0.0;
    float norm = 0.0;
    float amplitude = 1.0;
    float s = scale;
    for (int i = 0; i < octaves; i++) {
        sum += amplitude * noise(q + vec2(time * 0.004 * amplitude), s);
        norm += amplitude;
        amplitude *= 0.6;
        s *= 2.0;
        q += vec2(cos(sum * TAU), sin(sum * TAU)) / s * 0.4;
    }
    return sum / norm;
}

vec3 lookat(vec3 v) {
    vec3 f = normalize(CAMERA);
    vec3 s = normalize(vec3(-f.z, 0.0, f.x));
    vec3 u = cross(s, f);
    return v.x * s + v.y * u - v.z * f;
}

vec3 rot_axis(vec3 v, vec3 axis, float angle) {
    vec3 q = axis * sin(angle * 0.5);
    float w = cos(angle * 0.5);
    return v + 2.0 * cross(q, cross(q, v) + w * v);
}

vec3 planet_normal(vec2 uv, float z, float spin) {
    return lookat(rot_axis(vec3(uv, z), normalize(ROTATION_AXIS), spin));
}

vec2 mercator(vec3 n) {
    return vec2(atan(n.z, n.x) * 0.5, acos(clamp(-n.y, -1.0, 1.0))) / PI;
}

float sphere_z(float len) {
    return -sqrt(max(0.999 - len * len, 0.0));
}

vec4 planet(vec2 uv, float fw, float spin) {
    float len = length(uv);
    if (len > 1.0 - fw * 0.3) {
        return vec4(0.0);
    }
    vec3 norm = planet_normal(uv, sphere_z(len), spin);
    vec2 muv = mercator(norm);
    float smooth_edge = smoothstep(1.0, 1.0 - fw * 2.0, len);
    float f = fw * 2.0;

    float continent = fbm(muv, 4.0, 7);
    float temp = fbm(muv * 3.0 + vec2(31.33), 1.0, 4);
    float humid = fbm(muv * 3.0 - vec2(54.1), 1.0, 4);

    float land = smoothstep(f, 0.0, OCEAN_SIZE - continent);
    vec3 col = LAND_COLOR;
    col = mix(col, DESERT_COLOR, smoothstep(0.25, 0.1, humid));
    float jungle = smoothstep(0.1, 0.3, humid) * smoothstep(0.3, 0.4, temp);
    col = mix(col, JUNGLE_COLOR, jungle);
    col = mix(col, SNOW_COLOR, smoothstep(0.3, 0.2, temp));
    col *= sqrt(continent) * land * 1.2 * smoothstep(1.0, 0.99, abs(norm.y));

    float ocean = smoothstep(OCEAN_SIZE, OCEAN_SIZE - f, continent);
    col += (1.0 - continent) * ocean * OCEAN_COLOR;
    col *= sqrt(1.0 + 0.1 * cos(sqrt(continent) * 512.0));
    return vec4(col, smooth_edge);
}

vec4 clouds(vec2 uv, float fw, float spin, float time) {
    float len = length(uv);
    if (len > 1.0 - fw * 0.3) {
        return vec4(0.0);
    }
    vec3 norm = planet_normal(uv, sphere_z(len), spin);
    vec2 muv = mercator(norm);
    float cover = swirly_fbm(-muv, 11.0, 6, time) * smoothstep(1.0, 0.99, abs(norm.y));
    return vec4(CLOUD_COLOR, exp(-pow(cover, 6.0) * 32.0));
}

vec4 atmosphere(vec2 uv) {
    float len = length(uv);
    float altitude = max(len - PLANET_RADIUS, 0.0);
    vec3 norm = lookat(vec3(uv, sphere_z(len)));
    float sunset_amount = min(
        smoothstep(0.5, -0.3, dot(norm, normalize(LIGHT1_POS))),
        smoothstep(0.5, -0.3, dot(norm, normalize(LIGHT2_POS))));
    float density = exp(-altitude * 7.0 * (1.0 + sunset_amount)) * len * len * ATMOSPHERE_DENSITY;
    vec3 sunset = mix(DAWN_COLOR, SUNSET_COLOR, exp(-altitude * 32.0) * sunset_amount);
    float rim = exp(-altitude * 16.0)
        * smoothstep(PLANET_RADIUS - 0.01, PLANET_RADIUS, len)
        * sunset_amount * 1.5;
    return vec4(mix(ATMOSPHERE_COLOR, sunset, rim), density);
}

void main() {
    vec2 res = params.resolution.xy;
    float min_res = min(res.x, res.y);
    vec2 uv = (frag_coord() * 2.0 - res) / min_res;
    vec2 q = uv / PLANET_RADIUS;
    // Derivatives must be taken in uniform control flow.
    float fw = fwidth(length(q));
    float len = length(uv);
    if (len > 1.3) {
        out_color = vec4(0.0);
        return;
    }

    float time = params.time;
    float spin = (params.pointer.z * 16.0 + time) * ROTATION_SPEED;

    vec4 planet_color = planet(q, fw, spin);
    vec3 norm = lookat(vec3(uv, sphere_z(len)));
    float light = max(dot(norm, normalize(LIGHT1_POS)) * 0.8 + 0.2, 0.0) * LIGHT1_STRENGTH
        + max(dot(norm, normalize(LIGHT2_POS)) * 0.8 + 0.2, 0.0) * LIGHT2_STRENGTH;

    vec4 clouds_color = clouds(q, fw, spin, time);
    clouds_color.rgb *= light + AMBIENT_LIGHT;
    vec4 atmosphere_color = atmosphere(uv);
    atmosphere_color.a *= smoothstep(1.2, 1.0, len);

    planet_color.rgb *= light + AMBIENT_LIGHT;
    atmosphere_color.rgb *= light;

    vec4 color = mix(planet_color, clouds_color, clouds_color.a);
    color = mix(color, atmosphere_color, atmosphere_color.a);
    color = clamp(color, vec4(0.0), vec4(1.0));
    out_color = vec4(color.rgb * color.a, color.a);
}
";

/// Sobel structure tensor of the red channel plus luminance.
pub const TENSOR_FRAGMENT: &str = r"
void main() {
    ivec2 c = ivec2(frag_coord());
    float tl = fetch_primary(c + ivec2(-1, -1)).r;
    float tm = fetch_primary(c + ivec2(0, -1)).r;
    float tr = fetch_primary(c + ivec2(1, -1)).r;
    float ml = fetch_primary(c + ivec2(-1, 0)).r;
    float mr = fetch_primary(c + ivec2(1, 0)).r;
    float bl = fetch_primary(c + ivec2(-1, 1)).r;
    float bm = fetch_primary(c + ivec2(0, 1)).r;
    float br = fetch_primary(c + ivec2(1, 1)).r;

    float gx = -tl + tr - 2.0 * ml + 2.0 * mr - bl + br;
    float gy = -tl - 2.0 * tm - tr + bl + 2.0 * bm + br;
    float luminance = dot(fetch_primary(c).rgb, LUMA);
    out_color = vec4(gx * gx, gy * gy, gx * gy, luminance);
}
";

/// Eight-sector anisotropic Kuwahara filter. Primary input is the tensor,
/// secondary is the scene.
pub const KUWAHARA_FRAGMENT: &str = r"
const int SECTORS = 8;
const float ETA = 0.1;
const float LAMBDA = 0.5;

float polynomial_weight(vec2 offset) {
    float value = (offset.x + ETA) - LAMBDA * offset.y * offset.y;
    return max(value * value, 0.0);
}

void main() {
    vec2 centre = frag_coord();
    ivec2 c = ivec2(centre);
    vec4 tensor = fetch_primary(c);
    float jxx = tensor.r;
    float jyy = tensor.g;
    float jxy = tensor.b;

    float trace = jxx + jyy;
    float determinant = jxx * jyy - jxy * jxy;
    float root = sqrt(max(trace * trace * 0.25 - determinant, 0.0));
    float lambda1 = trace * 0.5 + root;
    float lambda2 = trace * 0.5 - root;

    float strength = abs(jxy) / (abs(jxx) + abs(jyy) + abs(jxy) + 1e-6);
    vec2 o = vec2(0.0, 1.0);
    vec2 v = vec2(-jxy, jxx - lambda1);
    if (strength > 0.0 && length(v) > 0.0) {
        o = normalize(v);
    }

    float anisotropy = (lambda1 - lambda2) / (lambda1 + lambda2 + 1e-6);
    float alpha = params.alpha;
    float scale_x = alpha / (anisotropy + alpha);
    float scale_y = (anisotropy + alpha) / alpha;
    mat2 transform = mat2(o.x, -o.y, o.y, o.x) * mat2(scale_x, 0.0, 0.0, scale_y);

    int radius = int(params.radius);
    bool found = false;
    float best_variance = 0.0;
    vec3 best_mean = vec3(0.0);
    for (int i = 0; i < SECTORS; i++) {
        float angle = float(i) * TAU / float(SECTORS);
        vec3 sum = vec3(0.0);
        vec3 squared = vec3(0.0);
        float total = 0.0;
        for (int r = 1; r <= radius; r++) {
            for (int j = -2; j <= 2; j++) {
                float a = angle + float(j) * PI / 16.0;
                vec2 offset = transform * (float(r) * vec2(cos(a), sin(a)));
                vec3 colour = sample_secondary(centre + offset).rgb;
                float weight = polynomial_weight(offset);
                sum += colour * weight;
                squared += colour * colour * weight;
                total += weight;
            }
        }
        if (total > 0.0) {
            vec3 mean = sum / total;
            float variance = dot(squared / total - mean * mean, LUMA);
            if (!found || variance < best_variance) {
                found = true;
                best_variance = variance;
                best_mean = mean;
            }
        }
    }
    if (!found) {
        best_mean = fetch_secondary(c).rgb;
    }
    out_color = vec4(best_mean, 1.0);
}
";

/// Posterise, saturate, ACES tone-map and multiply by the paper grain.
pub const COMPOSITE_FRAGMENT: &str = r"
const vec3 SATURATION_WEIGHTS = vec3(0.2125, 0.7154, 0.0721);

vec3 aces(vec3 x) {
    float a = 2.51;
    float b = 0.03;
    float c = 2.43;
    float d = 0.59;
    float e = 0.14;
    return clamp((x * (a * x + b)) / (x * (c * x + d) + e), vec3(0.0), vec3(1.0));
}

void main() {
    vec2 p = frag_coord();
    vec3 color = fetch_primary(ivec2(p)).rgb;
    vec4 paper = textureLod(sampler2D(secondary_texture, input_sampler), gl_FragCoord.xy * params.resolution.zw, 0.0);

    float mask = step(0.001, length(color));
    float q = clamp(floor(dot(color, LUMA) * 15.0 + 0.5) / 15.0, 0.2, 0.7);
    if (q < 0.5) {
        color = mix(vec3(0.1), color, q * 2.0);
    } else {
        color = mix(color, vec3(1.0), (q - 0.5) * 2.0);
    }
    color = mix(vec3(dot(color, SATURATION_WEIGHTS)), color, 1.5);
    color = aces(color);
    out_color = vec4(color, mask) * paper;
}
";

/// Straight-alpha confetti canvas stretched over the surface.
pub const OVERLAY_FRAGMENT: &str = r"
void main() {
    out_color = textureLod(sampler2D(primary_texture, input_sampler), gl_FragCoord.xy * params.resolution.zw, 0.0);
}
";

/// Full-screen triangle vertex shader.
const VERTEX_SHADER_GLSL: &str = r"#version 450
layout(location = 0) out vec2 v_uv;

const vec2 positions[3] = vec2[3](
    vec2(-1.0, -3.0),
    vec2(3.0, 1.0),
    vec2(-1.0, 1.0)
);

void main() {
    uint vertex_index = uint(gl_VertexIndex);
    vec2 pos = positions[vertex_index];
    v_uv = pos * 0.5 + vec2(0.5, 0.5);
    gl_Position = vec4(pos, 0.0, 1.0);
}
";
