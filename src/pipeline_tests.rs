//! End-to-end pipeline tests against the real filesystem.
//!
//! These cover the whole path from entry file to written HTML:
//! - a three-module import chain rendered into one page
//! - content-addressed asset copying and import rewriting

#[cfg(test)]
mod tests {
    use crate::assets::generate_file_hash;
    use crate::builder::PageBuilder;
    use crate::bundler::Bundler;
    use crate::config::BuildOptions;
    use crate::fs::{FileSystem, OsFileSystem};
    use regex::Regex;
    use std::path::Path;

    fn write(root: &Path, rel: &str, contents: &[u8]) {
        OsFileSystem.write(&root.join(rel), contents).unwrap();
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // IMPORT CHAIN
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_import_chain_renders_every_module() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(
            root,
            "pages/A.jsx",
            b"import B from './B.jsx';\nexport default function A() { return <main><h1>A</h1><B label=\"from A\" /></main>; }\n",
        );
        write(
            root,
            "pages/B.jsx",
            b"import C from './C.jsx';\nexport default function B({ label }) { return <section data-label={label}><C /></section>; }\n",
        );
        write(root, "pages/C.jsx", b"export default function C() { return <p>C leaf</p>; }\n");

        let out = root.join("dist");
        let options = BuildOptions::default().with_output_dir(&out);
        let pages = PageBuilder::new(options).build_file(&root.join("pages/A.jsx")).unwrap();

        assert_eq!(pages.len(), 1);
        assert_eq!(
            pages[0].html,
            "<main><h1>A</h1><section data-label=\"from A\"><p>C leaf</p></section></main>"
        );
        let written = OsFileSystem.read_to_string(&out.join("A.html")).unwrap();
        assert_eq!(written, pages[0].html);
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // ASSETS
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_asset_import_is_hashed_copied_and_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let png: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 1, 2, 3, 4];
        write(root, "pages/logo.png", png);
        write(
            root,
            "pages/index.jsx",
            b"import logo from './logo.png';\nexport default function Home() { return <img src={logo} alt=\"logo\" />; }\n",
        );

        let out = root.join("dist");
        let options = BuildOptions::default().with_output_dir(&out);
        let bundle = Bundler::new(options.clone()).bundle(&root.join("pages/index.jsx")).unwrap();

        let pattern = Regex::new(r#"const logo = "/assets/logo-([0-9a-f]{8})\.png";"#).unwrap();
        let caps = pattern.captures(&bundle.code).unwrap_or_else(|| panic!("{}", bundle.code));
        assert_eq!(&caps[1], generate_file_hash(png));

        assert_eq!(bundle.assets.len(), 1);
        let copied = &bundle.assets[0].output_path;
        assert_eq!(copied, &out.join("assets").join(format!("logo-{}.png", &caps[1])));
        assert_eq!(OsFileSystem.read(copied).unwrap(), png);

        let pages = PageBuilder::new(options).build_file(&root.join("pages/index.jsx")).unwrap();
        assert_eq!(
            pages[0].html,
            format!("<img src=\"/assets/logo-{}.png\" alt=\"logo\" />", &caps[1])
        );
    }
}
