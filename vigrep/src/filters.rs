//! Filters deciding what gets read: which files are scanned, and which
//! blocks of a container are loaded.
use std::path::Path;

use crate::config::RegionCodes;
use crate::container::BlockHeader;

/// Checks if a file has the scanned extension. The comparison is
/// case-sensitive, so `a.VI` is not a candidate for `vi`.
pub fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext == extension)
}

/// Selects the block headers whose identifier contains any of the region
/// codes, keeping their original order.
pub fn filter_block_headers<'a>(
    headers: &'a [BlockHeader],
    codes: &RegionCodes,
) -> Vec<&'a BlockHeader> {
    headers
        .iter()
        .filter(|header| codes.matches(&header.ident))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Ident;

    fn header(ident: &[u8; 4]) -> BlockHeader {
        BlockHeader {
            ident: Ident(*ident),
            offset: 0,
            length: 0,
            sections: vec![],
        }
    }

    #[test]
    fn test_has_extension() {
        assert!(has_extension(Path::new("panel.vi"), "vi"));
        assert!(has_extension(Path::new("dir/sub/panel.vi"), "vi"));
        assert!(!has_extension(Path::new("panel.VI"), "vi")); // case-sensitive
        assert!(!has_extension(Path::new("panel.vit"), "vi"));
        assert!(!has_extension(Path::new("panel.txt"), "vi"));
        assert!(!has_extension(Path::new("vi"), "vi"));
        assert!(has_extension(Path::new("types.ctl"), "ctl"));
    }

    #[test]
    fn test_filter_preserves_order() {
        let headers = vec![
            header(b"LVSR"),
            header(b"BDHb"),
            header(b"vers"),
            header(b"FPHb"),
            header(b"BDHb"),
            header(b"LIBN"),
        ];
        let filtered = filter_block_headers(&headers, &RegionCodes::default());
        let idents: Vec<String> = filtered.iter().map(|h| h.ident.to_string()).collect();
        assert_eq!(idents, vec!["BDHb", "FPHb", "BDHb"]);
    }

    #[test]
    fn test_filter_empty_when_no_region_matches() {
        let headers = vec![header(b"LVSR"), header(b"vers"), header(b"ICON")];
        assert!(filter_block_headers(&headers, &RegionCodes::default()).is_empty());
        assert!(filter_block_headers(&[], &RegionCodes::default()).is_empty());
    }

    #[test]
    fn test_filter_with_custom_codes() {
        let headers = vec![header(b"FPHb"), header(b"VCTP"), header(b"BDHb")];
        let codes = RegionCodes {
            front_panel: "VCT".to_string(),
            block_diagram: "BDH".to_string(),
        };
        let filtered = filter_block_headers(&headers, &codes);
        let idents: Vec<String> = filtered.iter().map(|h| h.ident.to_string()).collect();
        assert_eq!(idents, vec!["VCTP", "BDHb"]);
    }
}
