//! Runtime WGSL to SPIR-V compilation for the pipeline shaders.

/// Compile a WGSL module to SPIR-V words. Both entry points (vs_main and
/// fs_main) end up in the one module; the pipeline stages select them by
/// name.
pub(crate) fn compile_wgsl(source: &str) -> Result<Vec<u32>, String> {
    let module =
        naga::front::wgsl::parse_str(source).map_err(|e| format!("wgsl parse: {e}"))?;
    let info = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::PUSH_CONSTANT,
    )
    .validate(&module)
    .map_err(|e| format!("wgsl validate: {e:?}"))?;
    naga::back::spv::write_vec(&module, &info, &naga::back::spv::Options::default(), None)
        .map_err(|e| format!("spv emit: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const UI_SHADER: &str =
        include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/shaders/ui.wgsl"));

    #[test]
    fn ui_shader_compiles_to_spirv() {
        let words = compile_wgsl(UI_SHADER).expect("shader must compile");
        // SPIR-V magic number.
        assert_eq!(words[0], 0x0723_0203);
        assert!(words.len() > 16);
    }

    #[test]
    fn invalid_wgsl_is_reported() {
        assert!(compile_wgsl("fn broken(").is_err());
    }
}
