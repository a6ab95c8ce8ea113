/// Clamp joint indices into `[0, joint_count)` and normalize byte weights so
/// they sum to one. All-zero weights bind fully to joint 0.
///
/// # Arguments
///
/// * `indices` - Raw per-vertex bone indices.
/// * `weights` - Raw per-vertex weights in `0..=255`.
/// * `joint_count` - Number of joints in the skeleton (must be non-zero for
///   meaningful output; zero clamps every index to 0).
///
/// # Returns
///
/// `(joints, weights)` ready for the `JOINTS_0` / `WEIGHTS_0` streams.
pub fn normalize_influences(
    indices: [u8; 4],
    weights: [u8; 4],
    joint_count: usize,
) -> ([u16; 4], [f32; 4]) {
    let max_joint = joint_count.saturating_sub(1) as u16;
    let mut joints = indices.map(|index| (index as u16).min(max_joint));

    let total: u32 = weights.iter().map(|w| *w as u32).sum();
    if total == 0 {
        joints[0] = 0;
        return (joints, [1.0, 0.0, 0.0, 0.0]);
    }

    let scale = 1.0 / total as f32;
    (joints, weights.map(|w| w as f32 * scale))
}
