use crate::{loader::ExtensionManifest, merge::ComposedSchema, schema::UpstreamSchema};

pub(crate) const GITHUB_SDL: &str = include_str!("../tests/fixtures/github.graphql");
pub(crate) const STARGAZER_MANIFEST: &str = include_str!("../tests/fixtures/stargazers.yaml");

/// The GitHub fixture schema extended with `countSum` and `countMax`.
pub(crate) fn stargazer_schema() -> ComposedSchema {
    let upstream = UpstreamSchema::from_sdl(GITHUB_SDL).unwrap();
    ExtensionManifest::from_str(STARGAZER_MANIFEST)
        .unwrap()
        .into_registries()
        .unwrap()
        .compose(upstream)
        .unwrap()
}
