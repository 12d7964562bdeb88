use glbgraph_scene::animation::{repair_quaternion_continuity, split_morph_weights};
use glbgraph_scene::AnimData;
use proptest::prelude::*;

fn quaternions() -> impl Strategy<Value = Vec<f32>> {
    prop::collection::vec(prop::array::uniform4(-1.0f32..1.0), 1..32)
        .prop_map(|keys| keys.into_iter().flatten().collect())
}

proptest! {
    #[test]
    fn repaired_rotations_stay_in_one_hemisphere(mut data in quaternions()) {
        let original = data.clone();
        repair_quaternion_continuity(&mut data);

        for (key, repaired) in data.chunks_exact(4).enumerate() {
            let source = &original[key * 4..key * 4 + 4];
            let same = repaired == source;
            let negated = repaired.iter().zip(source).all(|(a, b)| *a == -*b);
            prop_assert!(same || negated);
        }
        for pair in data.windows(8).step_by(4) {
            let dot: f32 = pair[..4].iter().zip(&pair[4..]).map(|(a, b)| a * b).sum();
            prop_assert!(dot >= 0.0);
        }
    }

    #[test]
    fn morph_split_reinterleaves(
        targets in 1usize..6,
        keys in 1usize..12,
        seed in prop::collection::vec(-10.0f32..10.0, 72),
    ) {
        let data: Vec<f32> = seed.into_iter().take(targets * keys).collect();
        let output = AnimData::new(1, data.clone());
        let split = split_morph_weights(&output, keys);

        prop_assert_eq!(split.len(), targets);
        for curve in &split {
            prop_assert_eq!(curve.components, 1);
            prop_assert_eq!(curve.data.len(), keys);
        }
        let rebuilt: Vec<f32> = (0..keys)
            .flat_map(|k| split.iter().map(move |curve| curve.data[k]))
            .collect();
        prop_assert_eq!(rebuilt, data);
    }
}
