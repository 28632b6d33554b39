use corpus_extract::{
    code_dump, files_listing, slim_files_listing, tree_dump, ArtifactReader, BuildMode,
    Compression, CorpusLayout, ExtractConfig, ExtractError, PartialsOrchestrator, TotalsBuilder,
    FILES_LISTING, PACKAGES_LISTING, SLIM_FILES_LISTING,
};
use pretty_assertions::assert_eq;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;
use tokio::io::AsyncReadExt;

const RULES_FILE: &str = "code.excluded.txt";

struct Corpus {
    temp: TempDir,
}

impl Corpus {
    fn new(rules: &str) -> Self {
        let temp = TempDir::new().expect("tempdir");
        std::fs::create_dir_all(temp.path().join("current")).expect("create current");
        std::fs::write(temp.path().join(RULES_FILE), rules).expect("write rules");
        Self { temp }
    }

    fn root(&self) -> &Path {
        self.temp.path()
    }

    fn config(&self) -> ExtractConfig {
        ExtractConfig {
            dir: self.root().to_path_buf(),
            basedir: self.root().to_path_buf(),
            excluded: PathBuf::from(RULES_FILE),
            ..ExtractConfig::default()
        }
    }

    fn partial(&self, package_id: &str) -> PathBuf {
        self.root().join("partials").join(package_id)
    }

    fn out(&self) -> PathBuf {
        self.root().join("out")
    }

    /// Pack `files` (relative path, contents) into `current/<package_id>`
    fn add_archive(&self, package_id: &str, files: &[(&str, &str)]) {
        let staging = TempDir::new().expect("staging");
        let mut names = Vec::new();
        for (name, contents) in files {
            let path = staging.path().join(name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).expect("create staging dir");
            }
            std::fs::write(&path, contents).expect("write staging file");
            names.push(*name);
        }
        let status = Command::new("tar")
            .arg("-czf")
            .arg(self.root().join("current").join(package_id))
            .arg("-C")
            .arg(staging.path())
            .args(&names)
            .status()
            .expect("run tar");
        assert!(status.success(), "tar failed for {package_id}");
    }

    async fn partials(&self, config: &ExtractConfig, mode: BuildMode) -> corpus_extract::PartialsReport {
        PartialsOrchestrator::from_config(config)
            .expect("orchestrator")
            .run(mode, None)
            .await
            .expect("partials run")
    }
}

fn read(path: impl AsRef<Path>) -> String {
    std::fs::read_to_string(path.as_ref())
        .unwrap_or_else(|err| panic!("read {}: {err}", path.as_ref().display()))
}

async fn read_gzip(path: impl AsRef<Path>) -> String {
    let mut reader = ArtifactReader::open(path, Compression::Gzip)
        .await
        .expect("open gzip");
    let mut text = String::new();
    reader
        .reader()
        .read_to_string(&mut text)
        .await
        .expect("read gzip");
    reader.finish().await.expect("gzip trailer");
    text
}

fn sample_package() -> Vec<(&'static str, &'static str)> {
    vec![
        ("package/package.json", "{\"name\":\"pkg\"}\n"),
        ("package/index.js", "var a = 1;\n\nvar b = 2;\n"),
        ("package/test/t.js", "assert(a);\n"),
    ]
}

#[tokio::test]
async fn builds_listings_and_code_dump_for_one_package() {
    let corpus = Corpus::new("test/\n");
    corpus.add_archive("pkg-1.0.0.tgz", &sample_package());

    let report = corpus.partials(&corpus.config(), BuildMode::Missing).await;
    assert_eq!(report.built, 1);
    assert_eq!(report.errors, 0);

    let partial = corpus.partial("pkg-1.0.0.tgz");
    assert_eq!(
        read(partial.join(FILES_LISTING)),
        "pkg-1.0.0.tgz/index.js\npkg-1.0.0.tgz/package.json\npkg-1.0.0.tgz/test/t.js\n"
    );
    assert_eq!(
        read(partial.join(SLIM_FILES_LISTING)),
        "pkg-1.0.0.tgz/index.js\npkg-1.0.0.tgz/package.json\n"
    );
    assert_eq!(
        read(partial.join(files_listing(".js"))),
        "pkg-1.0.0.tgz/index.js\npkg-1.0.0.tgz/test/t.js\n"
    );
    assert_eq!(read(partial.join(slim_files_listing(".js"))), "pkg-1.0.0.tgz/index.js\n");
    assert_eq!(read(partial.join(files_listing(".ts"))), "");
    assert_eq!(
        read(partial.join(code_dump(".js"))),
        "pkg-1.0.0.tgz/index.js:1:var a = 1;\npkg-1.0.0.tgz/index.js:3:var b = 2;\n"
    );
    assert_eq!(read(partial.join(code_dump(".coffee"))), "");
    assert_eq!(read(partial.join("package.json")), "{\"name\":\"pkg\"}\n");
    assert!(!partial.join(tree_dump(".js")).exists());

    let scratch = corpus.root().join("tmp");
    assert!(!scratch.exists() || std::fs::read_dir(&scratch).expect("tmp").next().is_none());
}

#[tokio::test]
async fn second_run_skips_existing_partials() {
    let corpus = Corpus::new("");
    corpus.add_archive("pkg-1.0.0.tgz", &sample_package());
    let config = corpus.config();

    corpus.partials(&config, BuildMode::Missing).await;
    let listing = corpus.partial("pkg-1.0.0.tgz").join(FILES_LISTING);
    let before = read(&listing);

    let report = corpus.partials(&config, BuildMode::Missing).await;
    assert_eq!(report.built, 0);
    assert_eq!(report.skipped, 1);
    assert_eq!(read(&listing), before);
}

#[tokio::test]
async fn rebuild_reuses_the_recorded_listing() {
    let corpus = Corpus::new("");
    corpus.add_archive("pkg-1.0.0.tgz", &sample_package());
    let config = corpus.config();
    corpus.partials(&config, BuildMode::Missing).await;

    let listing = corpus.partial("pkg-1.0.0.tgz").join(FILES_LISTING);
    let recorded = format!("{}pkg-1.0.0.tgz/docs/notes.md\n", read(&listing));
    std::fs::write(&listing, &recorded).expect("rewrite listing");

    let report = corpus.partials(&config, BuildMode::Rebuild).await;
    assert_eq!(report.built, 1);
    assert_eq!(read(&listing), recorded);
    assert!(read(corpus.partial("pkg-1.0.0.tgz").join(SLIM_FILES_LISTING))
        .ends_with("pkg-1.0.0.tgz/docs/notes.md\n"));
}

#[tokio::test]
async fn interrupted_partial_is_rebuilt() {
    let corpus = Corpus::new("");
    corpus.add_archive("pkg-1.0.0.tgz", &sample_package());
    let remnant = corpus.partial("pkg-1.0.0.tgz");
    std::fs::create_dir_all(&remnant).expect("remnant");
    std::fs::write(remnant.join(SLIM_FILES_LISTING), "pkg-1.0.0.tgz/index.js\n").expect("remnant");
    std::fs::write(remnant.join(code_dump(".js")), "pkg-1.0.0.tgz/index.js:1:var").expect("remnant");

    let report = corpus.partials(&corpus.config(), BuildMode::Missing).await;
    assert_eq!(report.built, 1);
    assert_eq!(report.skipped, 0);
    assert!(remnant.join(FILES_LISTING).exists());
    assert_eq!(
        read(remnant.join(code_dump(".js"))),
        "pkg-1.0.0.tgz/index.js:1:var a = 1;\npkg-1.0.0.tgz/index.js:3:var b = 2;\n"
    );

    let again = corpus.partials(&corpus.config(), BuildMode::Missing).await;
    assert_eq!(again.built, 0);
    assert_eq!(again.skipped, 1);
}

#[tokio::test]
async fn failed_build_leaves_no_listing_behind() {
    let corpus = Corpus::new("");
    std::fs::write(corpus.root().join("current/broken-1.0.0.tgz"), "not an archive")
        .expect("broken archive");

    let report = corpus.partials(&corpus.config(), BuildMode::Missing).await;
    assert_eq!(report.errors, 1);
    assert!(!corpus.partial("broken-1.0.0.tgz").join(FILES_LISTING).exists());
}

#[tokio::test]
async fn archive_with_top_level_files_is_discarded() {
    let corpus = Corpus::new("");
    corpus.add_archive("good-1.0.0.tgz", &sample_package());
    corpus.add_archive(
        "flat-1.0.0.tgz",
        &[("README", "hello\n"), ("package/index.js", "x;\n")],
    );

    let report = corpus.partials(&corpus.config(), BuildMode::Missing).await;
    assert_eq!(report.built, 1);
    assert_eq!(report.errors, 1);
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].starts_with("flat-1.0.0.tgz: "));
    assert!(report.failures[0].contains("top-level files"));
    assert!(!corpus.partial("flat-1.0.0.tgz").exists());
    assert!(corpus.partial("good-1.0.0.tgz").join(FILES_LISTING).exists());
}

#[tokio::test]
async fn partials_without_archive_are_removed() {
    let corpus = Corpus::new("");
    corpus.add_archive("pkg-1.0.0.tgz", &sample_package());
    let stale = corpus.partial("gone-0.1.0.tgz");
    std::fs::create_dir_all(&stale).expect("stale partial");
    std::fs::write(stale.join(FILES_LISTING), "gone-0.1.0.tgz/index.js\n").expect("stale listing");

    let report = corpus.partials(&corpus.config(), BuildMode::Missing).await;
    assert_eq!(report.removed, 1);
    assert_eq!(report.built, 1);
    assert!(!stale.exists());
}

#[tokio::test]
async fn single_filter_limits_the_run() {
    let corpus = Corpus::new("");
    corpus.add_archive("a-1.0.0.tgz", &sample_package());
    corpus.add_archive("b-1.0.0.tgz", &sample_package());

    let report = PartialsOrchestrator::from_config(&corpus.config())
        .expect("orchestrator")
        .run(BuildMode::Missing, Some("b-1.0.0.tgz"))
        .await
        .expect("run");
    assert_eq!(report.built, 1);
    assert!(!corpus.partial("a-1.0.0.tgz").exists());
    assert!(corpus.partial("b-1.0.0.tgz").exists());
}

#[tokio::test]
async fn missing_rule_file_aborts_the_run() {
    let corpus = Corpus::new("");
    corpus.add_archive("pkg-1.0.0.tgz", &sample_package());
    let config = ExtractConfig {
        excluded: PathBuf::from("no-such-rules.txt"),
        ..corpus.config()
    };

    let err = PartialsOrchestrator::from_config(&config)
        .expect("orchestrator")
        .run(BuildMode::Missing, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ExtractError::ExclusionError(_)));
}

#[tokio::test]
async fn concurrent_run_is_rejected() {
    let corpus = Corpus::new("");
    let layout = CorpusLayout::new(corpus.root()).expect("layout");
    let _held = corpus_extract::acquire_run_lock(&layout).await.expect("lock");

    let err = TotalsBuilder::from_config(&corpus.config())
        .expect("totals")
        .run()
        .await
        .unwrap_err();
    assert!(matches!(err, ExtractError::Locked(_)));
}

#[tokio::test]
async fn totals_of_one_package_match_its_partial() {
    let corpus = Corpus::new("test/\n");
    corpus.add_archive("pkg-1.0.0.tgz", &sample_package());
    let config = corpus.config();
    corpus.partials(&config, BuildMode::Missing).await;

    let report = TotalsBuilder::from_config(&config)
        .expect("totals")
        .run()
        .await
        .expect("totals run");
    assert_eq!(report.packages, 1);
    assert_eq!(report.partials, 1);

    assert_eq!(read(corpus.out().join(PACKAGES_LISTING)), "pkg-1.0.0.tgz\n");
    let partial = corpus.partial("pkg-1.0.0.tgz");
    for name in &report.artifacts {
        assert_eq!(
            std::fs::read(corpus.out().join(name)).expect("total"),
            std::fs::read(partial.join(name)).expect("partial"),
            "{name}"
        );
    }
}

#[tokio::test]
async fn bundled_dependencies_stay_out_of_slim_artifacts() {
    let corpus = Corpus::new("node_modules\n");
    corpus.add_archive(
        "pkg-1.0.0.tgz",
        &[
            ("package/package.json", "{\"name\":\"pkg\"}\n"),
            ("package/index.js", "require('dep');\nmodule.exports = 1;\n"),
            ("package/node_modules/dep/index.js", "module.exports = 2;\n"),
        ],
    );
    corpus.partials(&corpus.config(), BuildMode::Missing).await;

    let partial = corpus.partial("pkg-1.0.0.tgz");
    let dependency = "pkg-1.0.0.tgz/node_modules/dep/index.js";
    let files = read(partial.join(FILES_LISTING));
    assert!(files.lines().any(|line| line == dependency));
    let slim = read(partial.join(SLIM_FILES_LISTING));
    assert_eq!(slim, "pkg-1.0.0.tgz/index.js\npkg-1.0.0.tgz/package.json\n");

    let code = read(partial.join(code_dump(".js")));
    assert_eq!(code.lines().count(), 2);
    assert!(code
        .lines()
        .all(|line| line.starts_with("pkg-1.0.0.tgz/index.js:")));
}

#[tokio::test]
async fn removed_package_leaves_every_total() {
    let corpus = Corpus::new("");
    let mut config = corpus.config();
    config.features.ast = true;
    corpus.add_archive("a-1.0.0.tgz", &tree_package());
    corpus.add_archive("b-1.0.0.tgz", &tree_package());
    corpus.partials(&config, BuildMode::Missing).await;
    let totals = TotalsBuilder::from_config(&config).expect("totals");
    totals.run().await.expect("first totals");
    assert!(read(corpus.out().join(FILES_LISTING)).contains("b-1.0.0.tgz/"));

    std::fs::remove_file(corpus.root().join("current/b-1.0.0.tgz")).expect("remove archive");
    let report = corpus.partials(&config, BuildMode::Missing).await;
    assert_eq!(report.removed, 1);
    assert_eq!(report.skipped, 1);
    let report = totals.run().await.expect("second totals");
    assert_eq!(report.packages, 1);

    for entry in std::fs::read_dir(corpus.out()).expect("out") {
        let path = entry.expect("entry").path();
        let text = read(&path);
        assert!(!text.contains("b-1.0.0.tgz"), "{} still names b", path.display());
        assert!(text.is_empty() || text.ends_with('\n'), "{}", path.display());
    }
    assert_eq!(
        read(corpus.out().join(FILES_LISTING)),
        "a-1.0.0.tgz/bad.js\na-1.0.0.tgz/index.js\na-1.0.0.tgz/package.json\n"
    );
}

fn tree_package() -> Vec<(&'static str, &'static str)> {
    vec![
        ("package/package.json", "{}\n"),
        ("package/index.js", "function hello() {\n  return 1;\n}\n"),
        ("package/bad.js", "function (\n"),
    ]
}

#[tokio::test]
async fn tree_dumps_merge_into_one_valid_object() {
    let corpus = Corpus::new("");
    let minified = "x".repeat(1000);
    corpus.add_archive("a-1.0.0.tgz", &tree_package());
    corpus.add_archive(
        "b-1.0.0.tgz",
        &[("package/package.json", "{}\n"), ("package/min.js", minified.as_str())],
    );
    corpus.add_archive("c-1.0.0.tgz", &[("package/package.json", "{}\n")]);
    let mut config = corpus.config();
    config.features.ast = true;

    let report = corpus.partials(&config, BuildMode::Missing).await;
    assert_eq!(report.built, 3);

    let name = tree_dump(".js");
    let partial: serde_json::Value =
        serde_json::from_str(&read(corpus.partial("a-1.0.0.tgz").join(&name))).expect("json");
    assert_eq!(partial["a-1.0.0.tgz/bad.js"], "unparsed");
    assert_eq!(partial["a-1.0.0.tgz/index.js"]["type"], "File");
    assert_eq!(read(corpus.partial("c-1.0.0.tgz").join(&name)), "{\n}\n");

    let totals = TotalsBuilder::from_config(&config)
        .expect("totals")
        .run()
        .await
        .expect("totals run");
    assert_eq!(totals.tree_members.get(&name), Some(&3));

    let merged: serde_json::Value =
        serde_json::from_str(&read(corpus.out().join(&name))).expect("merged json");
    let object = merged.as_object().expect("object");
    assert_eq!(object.len(), 3);
    assert_eq!(object["b-1.0.0.tgz/min.js"], "minified");
    assert_eq!(object["a-1.0.0.tgz/bad.js"], "unparsed");
}

#[tokio::test]
async fn compressed_run_round_trips() {
    let corpus = Corpus::new("");
    corpus.add_archive("a-1.0.0.tgz", &tree_package());
    let mut config = corpus.config();
    config.compress = true;
    config.features.ast = true;

    corpus.partials(&config, BuildMode::Missing).await;
    let name = tree_dump(".js");
    let partial = corpus.partial("a-1.0.0.tgz");
    // Code dumps stay plain even when compressing
    assert!(read(partial.join(code_dump(".js"))).starts_with("a-1.0.0.tgz/index.js:1:"));
    let dump: serde_json::Value =
        serde_json::from_str(&read_gzip(partial.join(&name)).await).expect("partial json");
    assert_eq!(dump.as_object().expect("object").len(), 2);

    TotalsBuilder::from_config(&config)
        .expect("totals")
        .run()
        .await
        .expect("totals run");

    assert_eq!(read_gzip(corpus.out().join(code_dump(".ts"))).await, "\n");
    assert_eq!(read(corpus.out().join(PACKAGES_LISTING)), "a-1.0.0.tgz\n");
    assert_eq!(
        read_gzip(corpus.out().join(code_dump(".js"))).await,
        read(partial.join(code_dump(".js")))
    );
    let merged: serde_json::Value =
        serde_json::from_str(&read_gzip(corpus.out().join(&name)).await).expect("merged json");
    assert_eq!(merged.as_object().expect("object").len(), 2);
}
