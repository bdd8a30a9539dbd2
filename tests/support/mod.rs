//! Shared fixtures: registries seeded like a small slicer installation.

use slicestack::settings::meta;
use slicestack::{ContainerRegistry, ContainerType, Definition, InstanceContainer, SettingDecl};

/// Installs a quiet test subscriber; respects `RUST_LOG` when set.
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A machine definition with no extruders and no preferred profiles.
#[allow(dead_code)]
pub fn machine_only_registry() -> ContainerRegistry {
    let mut registry = ContainerRegistry::new();
    registry
        .add_definition(
            Definition::new("generic_sla", "Generic SLA Printer")
                .with_setting("layer_height", SettingDecl::new("Layer Height", 0.05)),
        )
        .unwrap();
    registry
}

/// A two-extruder FDM machine plus the profile containers its preferred
/// entries resolve to, at several specificities:
///
/// - variants named "0.4 mm nozzle": one generic, one for `generic_fdm`
/// - materials named "PLA": one generic, one pinned to the 0.4 mm variant
/// - qualities named "Normal": one generic, one pinned to the variant PLA
#[allow(dead_code)]
pub fn seeded_registry() -> ContainerRegistry {
    let mut registry = ContainerRegistry::new();

    registry
        .add_definition(
            Definition::new("generic_fdm", "Generic FDM Printer")
                .with_metadata_entry(meta::PREFERRED_VARIANT, "0.4 mm nozzle")
                .with_metadata_entry(meta::PREFERRED_MATERIAL, "PLA")
                .with_metadata_entry(meta::PREFERRED_QUALITY, "Normal")
                .with_setting("layer_height", SettingDecl::new("Layer Height", 0.2))
                .with_setting("wall_line_count", SettingDecl::new("Wall Line Count", 2i64))
                .with_setting(
                    "adhesion_type",
                    SettingDecl::new("Build Plate Adhesion Type", "skirt"),
                ),
        )
        .unwrap();

    registry
        .add_definition(
            Definition::new("fdm_extruder_0", "Extruder 1")
                .with_metadata_entry(meta::MACHINE, "generic_fdm")
                .with_metadata_entry(meta::POSITION, "0")
                .with_setting("nozzle_size", SettingDecl::new("Nozzle Size", 0.4)),
        )
        .unwrap();
    registry
        .add_definition(
            Definition::new("fdm_extruder_1", "Extruder 2")
                .with_metadata_entry(meta::MACHINE, "generic_fdm")
                .with_metadata_entry(meta::POSITION, "1")
                .with_setting("nozzle_size", SettingDecl::new("Nozzle Size", 0.4)),
        )
        .unwrap();

    registry
        .add_instance(
            InstanceContainer::new("nozzle_04", ContainerType::Variant).with_name("0.4 mm nozzle"),
        )
        .unwrap();
    registry
        .add_instance(
            InstanceContainer::new("fdm_nozzle_04", ContainerType::Variant)
                .with_name("0.4 mm nozzle")
                .with_metadata_entry(meta::DEFINITION, "generic_fdm"),
        )
        .unwrap();

    registry
        .add_instance(
            InstanceContainer::new("generic_pla", ContainerType::Material).with_name("PLA"),
        )
        .unwrap();
    registry
        .add_instance(
            InstanceContainer::new("pla_04", ContainerType::Material)
                .with_name("PLA")
                .with_metadata_entry(meta::DEFINITION, "generic_fdm")
                .with_metadata_entry(meta::VARIANT, "0.4 mm nozzle"),
        )
        .unwrap();

    let mut normal = InstanceContainer::new("normal", ContainerType::Quality).with_name("Normal");
    normal.set_value("layer_height", 0.15).unwrap();
    registry.add_instance(normal).unwrap();

    let mut normal_pla = InstanceContainer::new("normal_pla_04", ContainerType::Quality)
        .with_name("Normal")
        .with_metadata_entry(meta::DEFINITION, "generic_fdm")
        .with_metadata_entry(meta::MATERIAL, "pla_04");
    normal_pla.set_value("layer_height", 0.12).unwrap();
    registry.add_instance(normal_pla).unwrap();

    registry
}
