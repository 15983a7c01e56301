//! On-disk fixture with a server distribution, templates and node storage.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use camino::Utf8PathBuf;
use tempfile::TempDir;

use warden_config::{Config, FileLocations, ServerEndpoint};

use crate::sync::TemplateSource;

pub(crate) struct ReplicaTree {
    dir: TempDir,
    locations: FileLocations,
}

impl ReplicaTree {
    pub(crate) const TEMPLATE_SCHEMA: &'static str = "<schema name=\"template\"/>\n";
    pub(crate) const DISTRIBUTION_CONFIG: &'static str = "<config><!-- distribution --></config>\n";
    pub(crate) const DEFAULT_REPLICATED: &'static str = "schema.xml,stopwords.txt,synonyms.txt";

    /// Lays out a distribution and template set for `major_version`.
    pub(crate) fn new(major_version: u32) -> Self {
        let tree = Self {
            dir: TempDir::new().expect("temp dir"),
            locations: FileLocations::for_major_version(major_version).expect("known layout"),
        };
        let conf = tree.distribution_root().join(tree.locations.distribution_conf_dir());
        write(&conf.join("schema.xml"), "<schema name=\"distribution\"/>\n");
        write(&conf.join("solrconfig.xml"), Self::DISTRIBUTION_CONFIG);
        write(&conf.join("stopwords.txt"), "a\nthe\n");
        write(&conf.join("synonyms.txt"), "tv => television\n");
        write(&conf.join("elevate.xml"), "<elevate/>\n");
        write(
            &tree
                .distribution_root()
                .join(tree.locations.distribution_lang_dir())
                .join("stopwords_en.txt"),
            "and\nor\n",
        );
        let dist = tree.distribution_root();
        write(&dist.join("dist/solr-core.jar"), "core");
        write(&dist.join("contrib/extraction/lib/tika-core.jar"), "tika");
        write(&dist.join("contrib/extraction/lib/poi/poi.jar"), "poi");
        write(&dist.join("example/start.jar"), "jetty");

        write(
            &tree.template_dir().join(tree.locations.template_schema()),
            Self::TEMPLATE_SCHEMA,
        );
        write(
            &tree.template_dir().join("data-config.xml"),
            "<dataConfig/>\n",
        );
        tree.declare_replicated(Some(Self::DEFAULT_REPLICATED));
        fs::create_dir_all(tree.storage_dir()).expect("create storage dir");
        tree
    }

    pub(crate) fn root(&self) -> &Path {
        self.dir.path()
    }

    pub(crate) fn distribution_root(&self) -> PathBuf {
        self.root().join("distribution")
    }

    pub(crate) fn template_dir(&self) -> PathBuf {
        self.root().join("templates")
    }

    /// Storage directory used by synchronisation tests.
    pub(crate) fn storage_dir(&self) -> PathBuf {
        self.root().join("storage")
    }

    pub(crate) fn topology_dir(&self) -> PathBuf {
        self.root().join("topology")
    }

    pub(crate) fn locations(&self) -> &FileLocations {
        &self.locations
    }

    pub(crate) fn volume_conf_dir(&self) -> PathBuf {
        self.storage_dir().join(self.locations.volume_conf_dir())
    }

    pub(crate) fn volume_lang_dir(&self) -> PathBuf {
        self.storage_dir().join(self.locations.volume_lang_dir())
    }

    pub(crate) fn source(&self) -> TemplateSource {
        TemplateSource {
            distribution_root: self.distribution_root(),
            template_dir: self.template_dir(),
        }
    }

    /// Configuration rooted entirely inside the fixture.
    pub(crate) fn config(&self) -> Config {
        Config {
            instance_id: "Replica_IN_0".to_owned(),
            server_major_version: self.locations.major_version(),
            volume_size_mb: 64,
            volume_root: utf8(self.root().join("volumes")),
            cache_dir: utf8(self.root().join("cache")),
            cache_capacity_mb: 256,
            distribution_root: utf8(self.distribution_root()),
            template_dir: utf8(self.template_dir()),
            listen: ServerEndpoint::new("127.0.0.1", 8984),
            topology_dir: utf8(self.topology_dir()),
            poll_interval_secs: 1,
            kill_timeout_ms: 500,
            ..Config::default()
        }
    }

    /// Rewrites the template server config, optionally declaring the
    /// replicated file list.
    pub(crate) fn declare_replicated(&self, files: Option<&str>) {
        let handler = files.map_or_else(String::new, |list| {
            format!(
                concat!(
                    "  <requestHandler name=\"/replication\" class=\"solr.ReplicationHandler\">\n",
                    "    <lst name=\"master\">\n",
                    "      <str name=\"replicateAfter\">commit</str>\n",
                    "      <str name=\"confFiles\">{}</str>\n",
                    "    </lst>\n",
                    "  </requestHandler>\n",
                ),
                list
            )
        });
        write(
            &self.template_dir().join(self.locations.template_config()),
            &format!("<config>\n  <luceneMatchVersion>4.0</luceneMatchVersion>\n{handler}</config>\n"),
        );
    }

    pub(crate) fn write_template_schema(&self, contents: &str) {
        write(
            &self.template_dir().join(self.locations.template_schema()),
            contents,
        );
    }

    /// Publishes `endpoint` as the master's base URL.
    pub(crate) fn publish_master(&self, endpoint: &str) {
        write(&self.topology_dir().join("master.endpoint"), &format!("{endpoint}\n"));
    }

    pub(crate) fn read(&self, path: &Path) -> String {
        fs::read_to_string(path).unwrap_or_else(|error| panic!("read {}: {error}", path.display()))
    }

    /// Relative path and contents of every file under the storage directory.
    pub(crate) fn snapshot(&self) -> BTreeMap<PathBuf, String> {
        let mut files = BTreeMap::new();
        collect(&self.storage_dir(), &self.storage_dir(), &mut files);
        files
    }
}

fn collect(base: &Path, dir: &Path, files: &mut BTreeMap<PathBuf, String>) {
    for entry in fs::read_dir(dir).expect("list storage") {
        let path = entry.expect("directory entry").path();
        if path.is_dir() {
            collect(base, &path, files);
        } else {
            let relative = path.strip_prefix(base).expect("nested path").to_path_buf();
            let contents = fs::read_to_string(&path).expect("read file");
            files.insert(relative, contents);
        }
    }
}

fn write(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent");
    }
    fs::write(path, contents).expect("write fixture file");
}

fn utf8(path: PathBuf) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(path).expect("temp paths are UTF-8")
}
