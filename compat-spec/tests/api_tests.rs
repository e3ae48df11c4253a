use compat_spec::{
    CompatibilitySpec,
    host::HostMetadata,
    jobspec::Jobspec,
    levels::CompatibilityLevel,
    select::{self, HostIndex, SimulationConfig, SimulationMode},
    spack::{
        HostSystem, INSTALL_ENV_FILE_NAME, InstallEnvironment, SPEC_FILE_NAME, SpackSpec,
        read_json, spec_from_spack_install,
    },
};
use rand::{SeedableRng, rngs::StdRng};
use serde_json::{Value, json};
use std::{collections::BTreeMap, fs, path::Path};

fn write_json(path: &Path, value: &Value) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, serde_json::to_string_pretty(value).unwrap()).unwrap();
}

fn host(platform: &str, os_version: &str, mpi: &str) -> Value {
    json!({
        "results": {
            "system": {"sections": {"arch": {"name": platform}}},
            "nfd": {"sections": {"system": {
                "osrelease.ID": "rhel",
                "osrelease.VERSION_ID": os_version
            }}},
            "library": {"sections": {"mpi": {"variant": mpi, "version": "2.3.7"}}}
        }
    })
}

#[test]
fn test_spack_install_to_simulated_selection() {
    let workdir = tempfile::tempdir().unwrap();

    // A LAMMPS install built on corona
    let prefix = workdir.path().join("opt/linux-rhel8-zen2/gcc-12.1.1/lammps-a");
    write_json(
        &prefix.join(".spack").join(SPEC_FILE_NAME),
        &json!({"spec": {"nodes": [
            {"name": "lammps", "version": "20230802.2", "hash": "a",
             "dependencies": [
                 {"name": "fftw", "hash": "f"},
                 {"name": "openmpi", "hash": "o"}
             ]},
            {"name": "fftw", "version": "3.3.10", "hash": "f"},
            {"name": "openmpi", "version": "4.1.2", "hash": "o"}
        ]}}),
    );
    write_json(
        &prefix.join(".spack").join(INSTALL_ENV_FILE_NAME),
        &json!({"host_os": "rhel8", "host_target": "zen2"}),
    );
    let system_path = workdir.path().join("compspec-system.json");
    write_json(
        &system_path,
        &json!({"extractors": {"system": {"sections": {
            "arch": {"name": "amd64"},
            "processor": {"0.vendor": "AuthenticAMD", "0.target": "zen2"},
            "os": {"release": "8.9", "vendor": "rhel"}
        }}}}),
    );

    let spack: SpackSpec = read_json(&prefix.join(".spack").join(SPEC_FILE_NAME)).unwrap();
    let environ: InstallEnvironment =
        read_json(&prefix.join(".spack").join(INSTALL_ENV_FILE_NAME)).unwrap();
    let system = HostSystem::new(read_json(&system_path).unwrap());
    let spec = spec_from_spack_install(&spack, &environ, &system).unwrap();

    let spec_path = workdir.path().join("specs").join("lammps-a.json");
    fs::create_dir_all(spec_path.parent().unwrap()).unwrap();
    fs::write(&spec_path, spec.to_json_pretty().unwrap()).unwrap();
    let spec = CompatibilitySpec::from_path(&spec_path).unwrap();
    assert_eq!(spec.find_attribute("os.release"), Some("8.9"));

    // openmpi comes from a Spack environment on corona, not from the system
    let config = SimulationConfig::from_yaml(
        r#"
truth:
  lammps-a.json: corona
gpu:
  "no": [corona, quartz, lassen]
mpi_variants:
  openmpi: [corona]
"#,
    )
    .unwrap();

    let mut index = HostIndex::new(&config);
    for (name, doc) in [
        ("corona", host("amd64", "8.9", "mvapich2")),
        ("quartz", host("amd64", "8.9", "mvapich2")),
        ("lassen", host("ppc64le", "7.9", "spectrum-mpi")),
    ] {
        index.add_host(name, &HostMetadata::new(doc)).unwrap();
    }

    let specs = BTreeMap::from([("lammps-a.json".to_string(), spec)]);
    let mut rng = StdRng::seed_from_u64(42);
    let results = select::simulate(&specs, &index, &config.truth, 50, &mut rng).unwrap();

    for mode in SimulationMode::iter_variants() {
        assert_eq!(results[&mode.to_string()]["lammps-a"].len(), 50);
    }

    let accuracy = select::accuracy(&results);
    assert_eq!(accuracy["descriptive-basic"], 1.0);
    assert!(accuracy["basic"] > 0.0 && accuracy["basic"] <= 1.0);
    assert!(accuracy["platform-version"] <= accuracy["descriptive-basic"]);

    // Selections never leave the platform
    assert!(
        results["basic"]["lammps-a"]
            .iter()
            .all(|outcome| outcome.selected.as_deref() != Some("lassen"))
    );
}

#[test]
fn test_missing_ground_truth_is_an_error() {
    let mut spec = CompatibilitySpec::lammps_prototype();
    spec.set_attribute("io.archspec", "cpu.target", "amd64");
    spec.set_attribute("org.supercontainers", "os.release", "8.9");
    spec.set_attribute("org.supercontainers", "mpi.implementation", "openmpi");

    let specs = BTreeMap::from([("unknown.json".to_string(), spec)]);
    let index = HostIndex::new(&SimulationConfig::default());
    let mut rng = StdRng::seed_from_u64(0);

    assert!(select::simulate(&specs, &index, &BTreeMap::new(), 1, &mut rng).is_err());
}

#[test]
fn test_extracted_spec_to_jobspecs() {
    let mut spec = CompatibilitySpec::lammps_prototype();
    spec.set_attribute("io.archspec", "cpu.target", "amd64");
    spec.set_attribute("org.supercontainers", "os.name", "Ubuntu 22.04.4 LTS");
    spec.set_attribute("org.supercontainers", "os.vendor", "ubuntu");
    spec.set_attribute("org.supercontainers", "os.release", "22.04");
    spec.set_attribute("org.supercontainers", "hardware.gpu.available", "no");
    spec.set_attribute("org.supercontainers", "mpi.implementation", "mpich");
    spec.set_attribute("org.supercontainers", "mpi.version", "4.1.1");

    let command = vec!["lmp".to_string(), "-nocite".to_string()];
    let num_requirements: Vec<usize> = CompatibilityLevel::iter_variants()
        .map(|level| {
            Jobspec::from_compatibility_spec(&spec, &command, 2, 4, "lammps", *level)
                .attributes
                .system
                .requires
                .values()
                .map(|attrs| attrs.len())
                .sum()
        })
        .collect();

    assert_eq!(num_requirements, vec![1, 3, 4, 5, 7]);
}
