#![no_main]
use ciborium::de::from_reader;
use libfuzzer_sys::fuzz_target;
use tsdf_core::SceneSnapshot;

fuzz_target!(|data: &[u8]| {
    let _ = from_reader::<SceneSnapshot, _>(data);
});
