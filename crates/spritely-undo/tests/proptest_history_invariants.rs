//! Property-based invariant tests for the undo history.
//!
//! These verify the engine's core laws over random edit scripts:
//!
//! 1. Round-trip: undoing everything restores the initial document state
//!    byte for byte, redoing everything restores the final state
//! 2. Saved-state law: recordings clear it, matching undos restore it
//! 3. Group counting equals the number of top-level entries
//! 4. Stream memory accounting matches the contained chunks
//! 5. Recording always clears the redo stream

mod common;

use common::{fixture, Fixture};
use proptest::prelude::*;
use spritely_raster::{ObjectId, PixelFormat};

// ── Edit operations ─────────────────────────────────────────────────────

/// One recorded-and-applied document edit.
#[derive(Debug, Clone)]
enum EditOp {
    SetSize { width: u32, height: u32 },
    SetFrames { frames: u16 },
    SetFrameDuration { frame: u16, millis: u32 },
    SetCurrentFrame { frame: u16 },
    PaintRect { x: u16, y: u16, w: u16, h: u16, value: u8 },
    SetLayerName { name: String },
    MoveCel { dx: i16, dy: i16 },
    SetPaletteColors { from: u8, len: u8, seed: u32 },
    SetMask { x: u16, y: u16, w: u16, h: u16 },
}

/// A script entry: a lone edit or an explicit group of edits.
#[derive(Debug, Clone)]
enum Entry {
    Single(EditOp),
    Group(Vec<EditOp>),
}

const CANVAS: u16 = 16;

fn op_strategy() -> impl Strategy<Value = EditOp> {
    prop_oneof![
        (1u32..64, 1u32..64).prop_map(|(width, height)| EditOp::SetSize { width, height }),
        (1u16..6).prop_map(|frames| EditOp::SetFrames { frames }),
        (0u16..6, 1u32..1000)
            .prop_map(|(frame, millis)| EditOp::SetFrameDuration { frame, millis }),
        (0u16..6).prop_map(|frame| EditOp::SetCurrentFrame { frame }),
        (0u16..CANVAS, 0u16..CANVAS, 1u16..CANVAS, 1u16..CANVAS, 0u8..=255).prop_map(
            |(x, y, w, h, value)| EditOp::PaintRect { x, y, w, h, value }
        ),
        "[a-z]{1,12}".prop_map(|name| EditOp::SetLayerName { name }),
        (-20i16..20, -20i16..20).prop_map(|(dx, dy)| EditOp::MoveCel { dx, dy }),
        (0u8..250, 1u8..5, any::<u32>())
            .prop_map(|(from, len, seed)| EditOp::SetPaletteColors { from, len, seed }),
        (0u16..CANVAS, 0u16..CANVAS, 0u16..8, 0u16..8)
            .prop_map(|(x, y, w, h)| EditOp::SetMask { x, y, w, h }),
    ]
}

fn entry_strategy() -> impl Strategy<Value = Entry> {
    prop_oneof![
        3 => op_strategy().prop_map(Entry::Single),
        1 => prop::collection::vec(op_strategy(), 1..4).prop_map(Entry::Group),
    ]
}

fn script_strategy() -> impl Strategy<Value = Vec<Entry>> {
    prop::collection::vec(entry_strategy(), 0..16)
}

// ── Fixture and application ─────────────────────────────────────────────

struct Doc {
    fx: Fixture,
    layer: ObjectId,
    image: ObjectId,
    cel: ObjectId,
    palette: ObjectId,
}

fn doc() -> Doc {
    let mut fx = fixture(PixelFormat::Indexed, CANVAS as u32, CANVAS as u32);
    let palette = fx.add_palette(0);
    let layer = fx.add_image_layer("Base");
    let (image, index) = fx.add_stock_image(CANVAS, CANVAS);
    let cel = fx.add_cel(layer, 0, index);
    Doc {
        fx,
        layer,
        image,
        cel,
        palette,
    }
}

/// Record the op, then mutate the document the way an editor would.
fn apply_op(doc: &mut Doc, op: &EditOp) {
    let fx = &mut doc.fx;
    match op {
        EditOp::SetSize { width, height } => {
            fx.history.record_set_size(&fx.objects, fx.sprite).unwrap();
            fx.objects
                .sprite_mut(fx.sprite)
                .unwrap()
                .set_size(*width, *height);
        }
        EditOp::SetFrames { frames } => {
            fx.history.record_set_frames(&fx.objects, fx.sprite).unwrap();
            fx.objects
                .sprite_mut(fx.sprite)
                .unwrap()
                .set_total_frames(*frames);
        }
        EditOp::SetFrameDuration { frame, millis } => {
            let total = fx.objects.sprite(fx.sprite).unwrap().total_frames();
            let frame = *frame % total;
            fx.history
                .record_set_frame_duration(&fx.objects, fx.sprite, frame)
                .unwrap();
            fx.objects
                .sprite_mut(fx.sprite)
                .unwrap()
                .set_frame_duration(frame, *millis);
        }
        EditOp::SetCurrentFrame { frame } => {
            fx.history.record_set_frame(&fx.objects, fx.sprite).unwrap();
            fx.objects
                .sprite_mut(fx.sprite)
                .unwrap()
                .set_current_frame(*frame);
        }
        EditOp::PaintRect { x, y, w, h, value } => {
            let x = (*x).min(CANVAS - 1);
            let y = (*y).min(CANVAS - 1);
            let w = (*w).min(CANVAS - x);
            let h = (*h).min(CANVAS - y);
            fx.history
                .record_image(&fx.objects, doc.image, x, y, w, h)
                .unwrap();
            let image = fx.objects.image_mut(doc.image).unwrap();
            for py in y..y + h {
                for px in x..x + w {
                    image.put_pixel(px, py, *value as u32);
                }
            }
        }
        EditOp::SetLayerName { name } => {
            fx.history
                .record_set_layer_name(&fx.objects, doc.layer)
                .unwrap();
            fx.objects.layer_mut(doc.layer).unwrap().set_name(name.clone());
        }
        EditOp::MoveCel { dx, dy } => {
            // Bytes 4..8 of the cel state block are x and y.
            fx.history.record_data(&fx.objects, doc.cel, 4, 4).unwrap();
            let cel = fx.objects.cel_mut(doc.cel).unwrap();
            cel.x = cel.x.wrapping_add(*dx);
            cel.y = cel.y.wrapping_add(*dy);
        }
        EditOp::SetPaletteColors { from, len, seed } => {
            let to = from.saturating_add(*len - 1).min(255);
            fx.history
                .record_set_palette_colors(&fx.objects, fx.sprite, doc.palette, *from, to)
                .unwrap();
            let palette = fx.objects.palette_mut(doc.palette).unwrap();
            for i in *from..=to {
                palette.set_entry(i as u16, seed.wrapping_add(i as u32));
            }
        }
        EditOp::SetMask { x, y, w, h } => {
            fx.history
                .record_set_mask(&fx.objects, fx.document)
                .unwrap();
            let doc_obj = fx.objects.document_mut(fx.document).unwrap();
            doc_obj.mask.replace(*x, *y, *w, *h);
            doc_obj.mask.set_pixel(0, 0, true);
        }
    }
}

/// Apply a script, returning the number of top-level entries recorded.
fn apply_script(doc: &mut Doc, script: &[Entry]) -> usize {
    for entry in script {
        match entry {
            Entry::Single(op) => apply_op(doc, op),
            Entry::Group(ops) => {
                doc.fx.history.open_group();
                for op in ops {
                    apply_op(doc, op);
                }
                doc.fx.history.close_group();
            }
        }
    }
    script.len()
}

fn undo_all(doc: &mut Doc) -> usize {
    let mut steps = 0;
    while doc.fx.history.can_undo() {
        doc.fx.history.undo(&mut doc.fx.objects).unwrap();
        steps += 1;
    }
    steps
}

fn redo_all(doc: &mut Doc) -> usize {
    let mut steps = 0;
    while doc.fx.history.can_redo() {
        doc.fx.history.redo(&mut doc.fx.objects).unwrap();
        steps += 1;
    }
    steps
}

// ═══════════════════════════════════════════════════════════════════════
// 1. Round-trip: undo-all restores the initial state, redo-all the final
// ═══════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn undo_all_then_redo_all_round_trips(script in script_strategy()) {
        let mut doc = doc();
        let initial = doc.fx.state_digest();

        let entries = apply_script(&mut doc, &script);
        let edited = doc.fx.state_digest();

        let undone = undo_all(&mut doc);
        prop_assert_eq!(undone, entries, "one undo step per top-level entry");
        prop_assert_eq!(doc.fx.state_digest(), initial.clone(), "undo-all restores the initial state");
        prop_assert!(!doc.fx.history.can_undo());

        let redone = redo_all(&mut doc);
        prop_assert_eq!(redone, entries);
        prop_assert_eq!(doc.fx.state_digest(), edited, "redo-all restores the edited state");

        // And once more around.
        undo_all(&mut doc);
        prop_assert_eq!(doc.fx.state_digest(), initial);
    }
}

// ═══════════════════════════════════════════════════════════════════════
// 2. Saved-state law
// ═══════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn saved_state_restored_by_matching_undos(
        before in script_strategy(),
        after in prop::collection::vec(entry_strategy(), 1..8),
    ) {
        let mut doc = doc();
        apply_script(&mut doc, &before);
        doc.fx.history.mark_saved_state();
        prop_assert!(doc.fx.history.is_saved_state());

        let entries = apply_script(&mut doc, &after);
        prop_assert!(!doc.fx.history.is_saved_state(), "recording clears saved state");

        for _ in 0..entries {
            doc.fx.history.undo(&mut doc.fx.objects).unwrap();
        }
        prop_assert!(doc.fx.history.is_saved_state(), "matching undos restore saved state");
    }
}

// ═══════════════════════════════════════════════════════════════════════
// 3. Group counting equals top-level entries
// ═══════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn group_count_equals_top_level_entries(script in script_strategy()) {
        let mut doc = doc();
        let entries = apply_script(&mut doc, &script);
        prop_assert_eq!(doc.fx.history.undo_group_count(), entries);
    }
}

// ═══════════════════════════════════════════════════════════════════════
// 4. Memory accounting matches contained chunks
// ═══════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn mem_size_matches_chunk_sizes(script in script_strategy()) {
        let mut doc = doc();
        apply_script(&mut doc, &script);

        let summed: usize = doc.fx.history.undo_stream().iter().map(|c| c.size()).sum();
        prop_assert_eq!(doc.fx.history.undo_mem_size(), summed);

        // Accounting also holds after undoing half the entries.
        let entries = doc.fx.history.undo_group_count();
        for _ in 0..entries / 2 {
            doc.fx.history.undo(&mut doc.fx.objects).unwrap();
        }
        let undo_sum: usize = doc.fx.history.undo_stream().iter().map(|c| c.size()).sum();
        let redo_sum: usize = doc.fx.history.redo_stream().iter().map(|c| c.size()).sum();
        prop_assert_eq!(doc.fx.history.undo_mem_size(), undo_sum);
        prop_assert_eq!(doc.fx.history.redo_mem_size(), redo_sum);
    }
}

// ═══════════════════════════════════════════════════════════════════════
// 5. Recording clears the redo stream
// ═══════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn recording_clears_redo(script in script_strategy(), op in op_strategy()) {
        let mut doc = doc();
        let entries = apply_script(&mut doc, &script);
        prop_assume!(entries > 0);

        doc.fx.history.undo(&mut doc.fx.objects).unwrap();
        prop_assert!(doc.fx.history.can_redo());

        apply_op(&mut doc, &op);
        prop_assert!(!doc.fx.history.can_redo());
    }
}
