//! Document composition: building new documents from pages of existing ones.
//!
//! One primitive covers merge (every index, natural order), split and
//! extract (a subset in any order), reorder (a permutation), and duplication
//! (repeated indices, honored verbatim). Object-id collisions between
//! sources are avoided by offset-remapping every copied object.

use lopdf::{Dictionary, Object};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::document::{
    inherited_entry, normalize_rotation, resolve_media_box, resolve_rotation, PdfDocument,
};
use crate::error::PdfPageError;

/// Pages to pull from one source document, in the order they should appear.
pub struct PageSelection<'a> {
    pub doc: &'a PdfDocument,
    pub page_indices: Vec<usize>,
    /// Per-page rotation deltas in degrees, parallel to `page_indices`.
    /// Deltas add to the intrinsic rotation and accumulate across edits.
    pub rotation_deltas: Option<Vec<i32>>,
}

impl<'a> PageSelection<'a> {
    /// Every page of `doc` in natural order.
    pub fn all(doc: &'a PdfDocument) -> Self {
        Self {
            doc,
            page_indices: (0..doc.page_count()).collect(),
            rotation_deltas: None,
        }
    }

    pub fn pages(doc: &'a PdfDocument, page_indices: Vec<usize>) -> Self {
        Self {
            doc,
            page_indices,
            rotation_deltas: None,
        }
    }

    pub fn with_rotations(mut self, deltas: Vec<i32>) -> Self {
        self.rotation_deltas = Some(deltas);
        self
    }
}

/// Build a new document from the given selections, concatenated in order.
///
/// Page indices are re-validated here regardless of what the caller claims
/// to have checked; a stale index is a hard failure, never a silent
/// misapplication to some other page. Intrinsic page sizes are preserved,
/// so mixed page sizes in one output are fine.
pub fn compose_document(sources: &[PageSelection]) -> Result<PdfDocument, PdfPageError> {
    if sources.is_empty() {
        return Err(PdfPageError::Operation("no source documents given".into()));
    }
    let selected: usize = sources.iter().map(|s| s.page_indices.len()).sum();
    if selected == 0 {
        return Err(PdfPageError::Operation(
            "composition selects no pages".into(),
        ));
    }

    let mut dest = lopdf::Document::with_version("1.7");
    let pages_id = dest.new_object_id();
    let mut kids: Vec<Object> = Vec::with_capacity(selected);

    for selection in sources {
        let source = &selection.doc.inner;
        let page_count = selection.doc.page_count();

        for &index in &selection.page_indices {
            if index >= page_count {
                return Err(PdfPageError::PageIndexOutOfRange { index, page_count });
            }
        }
        if let Some(deltas) = &selection.rotation_deltas {
            if deltas.len() != selection.page_indices.len() {
                return Err(PdfPageError::Operation(format!(
                    "{} rotation deltas for {} selected pages",
                    deltas.len(),
                    selection.page_indices.len()
                )));
            }
        }

        // Copy the whole source object table under an id offset, then pick
        // pages out of the copy.
        let id_offset = dest.max_id;
        for (old_id, object) in source.objects.iter() {
            let new_id = (old_id.0 + id_offset, old_id.1);
            dest.objects
                .insert(new_id, remap_object_refs(object.clone(), id_offset));
        }
        dest.max_id = dest.max_id.max(source.max_id + id_offset);

        let source_pages = source.get_pages();
        for (slot, &index) in selection.page_indices.iter().enumerate() {
            let src_page_id = *source_pages
                .get(&(index as u32 + 1))
                .ok_or(PdfPageError::PageIndexOutOfRange { index, page_count })?;
            let src_dict = source
                .get_object(src_page_id)
                .and_then(Object::as_dict)
                .map_err(|e| PdfPageError::Operation(format!("invalid page object: {}", e)))?;

            let remapped_id = (src_page_id.0 + id_offset, src_page_id.1);
            let mut page_dict = match dest.objects.get(&remapped_id) {
                Some(Object::Dictionary(dict)) => dict.clone(),
                _ => {
                    return Err(PdfPageError::Operation(
                        "copied page object went missing".into(),
                    ))
                }
            };

            // Re-parenting severs the source page tree, so inheritable
            // attributes must be materialized onto the page itself.
            for key in [b"MediaBox".as_slice(), b"Resources".as_slice()] {
                if !page_dict.has(key) {
                    if let Some(value) = inherited_entry(source, src_dict, key) {
                        page_dict.set(key, remap_object_refs(value, id_offset));
                    }
                }
            }

            let delta = selection
                .rotation_deltas
                .as_ref()
                .map(|d| d[slot])
                .unwrap_or(0);
            let rotation = normalize_rotation(resolve_rotation(source, src_dict) + delta);
            page_dict.set("Rotate", Object::Integer(rotation as i64));
            page_dict.set("Parent", Object::Reference(pages_id));

            // Each occurrence gets its own page dictionary so duplicates can
            // carry independent rotation; content and resources stay shared.
            let new_page_id = dest.add_object(Object::Dictionary(page_dict));
            kids.push(Object::Reference(new_page_id));
        }
    }

    let mut pages = Dictionary::new();
    pages.set("Type", Object::Name(b"Pages".to_vec()));
    pages.set("Count", Object::Integer(kids.len() as i64));
    pages.set("Kids", Object::Array(kids));
    dest.objects.insert(pages_id, Object::Dictionary(pages));

    let mut catalog = Dictionary::new();
    catalog.set("Type", Object::Name(b"Catalog".to_vec()));
    catalog.set("Pages", Object::Reference(pages_id));
    let catalog_id = dest.add_object(Object::Dictionary(catalog));
    dest.trailer.set("Root", Object::Reference(catalog_id));

    // Drop the source catalogs and anything else the new page tree cannot
    // reach.
    dest.prune_objects();

    debug!(pages = selected, sources = sources.len(), "composed document");
    Ok(PdfDocument::from_inner(dest))
}

/// One single-page document per page, in original order.
pub fn split_to_singles(doc: &PdfDocument) -> Result<Vec<PdfDocument>, PdfPageError> {
    (0..doc.page_count())
        .map(|index| compose_document(&[PageSelection::pages(doc, vec![index])]))
        .collect()
}

/// Rotate every page by the same delta.
pub fn rotate_pages(doc: &PdfDocument, delta: i32) -> Result<PdfDocument, PdfPageError> {
    let count = doc.page_count();
    compose_document(&[PageSelection::all(doc).with_rotations(vec![delta; count])])
}

/// Margins in points, measured inward from each MediaBox edge.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CropMargins {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

/// Set every page's CropBox to its MediaBox shrunk by `margins`.
///
/// The MediaBox itself is left untouched, so the visible area shrinks while
/// the intrinsic page geometry (and any content outside the crop) survives.
/// Margins that leave no page area fail the whole operation.
pub fn crop_pages(doc: &PdfDocument, margins: &CropMargins) -> Result<PdfDocument, PdfPageError> {
    for value in [margins.top, margins.right, margins.bottom, margins.left] {
        if !value.is_finite() || value < 0.0 {
            return Err(PdfPageError::Operation(format!(
                "crop margins must be non-negative, got {:?}",
                margins
            )));
        }
    }

    let mut inner = doc.inner.clone();
    for index in 0..doc.page_count() {
        let page_id = doc.page_id(index)?;
        let media_box = {
            let dict = inner
                .get_object(page_id)
                .and_then(Object::as_dict)
                .map_err(|e| PdfPageError::Operation(format!("invalid page object: {}", e)))?;
            resolve_media_box(&inner, dict)
        };

        let x1 = media_box[0] + margins.left;
        let y1 = media_box[1] + margins.bottom;
        let x2 = media_box[2] - margins.right;
        let y2 = media_box[3] - margins.top;
        if x2 <= x1 || y2 <= y1 {
            return Err(PdfPageError::Operation(format!(
                "crop margins leave no visible area on page {}",
                index
            )));
        }

        let dict = inner
            .get_object_mut(page_id)
            .and_then(Object::as_dict_mut)
            .map_err(|e| PdfPageError::Operation(format!("invalid page object: {}", e)))?;
        dict.set(
            "CropBox",
            Object::Array(vec![
                Object::Real(x1 as f32),
                Object::Real(y1 as f32),
                Object::Real(x2 as f32),
                Object::Real(y2 as f32),
            ]),
        );
    }

    debug!(pages = doc.page_count(), "cropped document");
    Ok(PdfDocument::from_inner(inner))
}

/// Recursively remap indirect references by an id offset.
fn remap_object_refs(obj: Object, offset: u32) -> Object {
    match obj {
        Object::Reference(id) => Object::Reference((id.0 + offset, id.1)),
        Object::Array(arr) => Object::Array(
            arr.into_iter()
                .map(|o| remap_object_refs(o, offset))
                .collect(),
        ),
        Object::Dictionary(mut dict) => {
            for (_, value) in dict.iter_mut() {
                *value = remap_object_refs(value.clone(), offset);
            }
            Object::Dictionary(dict)
        }
        Object::Stream(mut stream) => {
            for (_, value) in stream.dict.iter_mut() {
                *value = remap_object_refs(value.clone(), offset);
            }
            Object::Stream(stream)
        }
        other => other,
    }
}
