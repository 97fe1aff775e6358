// Copyright (C) 1997-2001 Id Software, Inc.
// GPL-2.0-or-later
//
// textures.rs — miptex lump: texture records, unique names, animation chains

use qfmod_common::qfiles::{miptex_size, MipTex, MIPLEVELS, MIPTEX_HEADER_SIZE, MIPTEX_NAME_LEN};

use crate::error::{ModelError, Result};
use crate::model_funcs::ModelFuncs;
use crate::model_types::{Texture, ANIM_CYCLE};

/// Longest texture name, leaving room for the terminator of the file field.
const MAX_TEX_NAME: usize = MIPTEX_NAME_LEN - 1;

/// Frames per animation sequence ('0'..'9' and 'A'..'J').
const MAX_ANIM_FRAMES: usize = 10;

pub(crate) struct LoadedTextures {
    pub textures: Vec<Option<Texture>>,
    pub skytexture: Option<usize>,
}

pub(crate) fn load_textures(
    model: &str,
    miptex: Vec<Option<MipTex>>,
    funcs: Option<&dyn ModelFuncs>,
) -> Result<LoadedTextures> {
    let mut textures: Vec<Option<Texture>> = Vec::with_capacity(miptex.len());
    let mut skytexture = None;

    for (i, mt) in miptex.into_iter().enumerate() {
        let Some(mt) = mt else {
            textures.push(None);
            continue;
        };
        let mt_name = mt.name_str();
        if mt.width & 15 != 0 || mt.height & 15 != 0 {
            return Err(ModelError::TextureNotAligned {
                model: model.to_string(),
                name: mt_name,
                width: mt.width,
                height: mt.height,
            });
        }

        let Some(size) = miptex_size(mt.width, mt.height) else {
            return Err(ModelError::TextureTooLarge {
                model: model.to_string(),
                name: mt_name,
                width: mt.width,
                height: mt.height,
            });
        };
        let mut pixels = mt.pixels;
        pixels.resize(size, 0);

        let mut offsets = [0u32; MIPLEVELS];
        for (o, &src) in offsets.iter_mut().zip(mt.offsets.iter()) {
            *o = src.saturating_sub(MIPTEX_HEADER_SIZE);
        }

        let name = unique_texture_name(&textures, &mt_name);
        if mt_name.starts_with("sky") {
            skytexture = Some(i);
        }
        textures.push(Some(Texture {
            name,
            width: mt.width,
            height: mt.height,
            offsets,
            pixels,
            ..Default::default()
        }));
    }

    if let Some(funcs) = funcs {
        let render_size = funcs.texture_render_size();
        for tx in textures.iter_mut().flatten() {
            tx.render = vec![0; render_size];
            funcs.process_texture(Some(tx));
        }
        funcs.process_texture(None);
    }

    sequence_animations(model, &mut textures)?;

    Ok(LoadedTextures {
        textures,
        skytexture,
    })
}

/// Truncate `s` to at most `len` bytes on a char boundary.
fn truncate_name(s: &str, len: usize) -> &str {
    if s.len() <= len {
        return s;
    }
    let mut end = len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// `name` made distinct from every texture already in `earlier` by tagging it
/// `~1`, `~2`, ... The tag is appended when it fits, otherwise it replaces
/// the tail of the name.
pub(crate) fn unique_texture_name(earlier: &[Option<Texture>], name: &str) -> String {
    let base = truncate_name(name, MAX_TEX_NAME);
    let taken = |candidate: &str| earlier.iter().flatten().any(|t| t.name == candidate);

    let mut candidate = base.to_string();
    let mut num: u32 = 1;
    while taken(&candidate) {
        let tag = format!("~{:x}", num);
        num += 1;
        candidate = if base.len() + tag.len() <= MAX_TEX_NAME {
            format!("{}{}", base, tag)
        } else {
            format!("{}{}", truncate_name(base, MAX_TEX_NAME - tag.len()), tag)
        };
    }
    candidate
}

enum Frame {
    Primary(usize),
    Alternate(usize),
}

fn anim_frame(name: &str) -> Option<Frame> {
    let c = name.as_bytes().get(1)?.to_ascii_uppercase();
    match c {
        b'0'..=b'9' => Some(Frame::Primary((c - b'0') as usize)),
        b'A'..=b'J' => Some(Frame::Alternate((c - b'A') as usize)),
        _ => None,
    }
}

/// Suffix shared by every frame of a sequence.
fn anim_suffix(name: &str) -> &[u8] {
    name.as_bytes().get(2..).unwrap_or(&[])
}

/// Link the `+Nname` textures into circular `anim_next` chains, one for the
/// primary frames and one for the alternate frames, cross linked through
/// `alternate_anims`.
pub(crate) fn sequence_animations(model: &str, textures: &mut [Option<Texture>]) -> Result<()> {
    for i in 0..textures.len() {
        let (name, sequenced) = match &textures[i] {
            Some(tx) if tx.name.starts_with('+') => (tx.name.clone(), tx.anim_next.is_some()),
            _ => continue,
        };
        if sequenced {
            continue;
        }

        let mut anims: [Option<usize>; MAX_ANIM_FRAMES] = [None; MAX_ANIM_FRAMES];
        let mut altanims: [Option<usize>; MAX_ANIM_FRAMES] = [None; MAX_ANIM_FRAMES];
        let mut max = 0;
        let mut altmax = 0;

        let bad = || ModelError::BadAnimatingTexture {
            model: model.to_string(),
            name: name.clone(),
        };

        for j in i..textures.len() {
            let Some(tx2) = &textures[j] else { continue };
            if !tx2.name.starts_with('+') || anim_suffix(&tx2.name) != anim_suffix(&name) {
                continue;
            }
            match anim_frame(&tx2.name).ok_or_else(bad)? {
                Frame::Primary(n) => {
                    anims[n] = Some(j);
                    max = max.max(n + 1);
                }
                Frame::Alternate(n) => {
                    altanims[n] = Some(j);
                    altmax = altmax.max(n + 1);
                }
            }
        }

        link_frames(model, &name, textures, &anims[..max], altanims[0])?;
        link_frames(model, &name, textures, &altanims[..altmax], anims[0])?;
    }
    Ok(())
}

fn link_frames(
    model: &str,
    name: &str,
    textures: &mut [Option<Texture>],
    frames: &[Option<usize>],
    other: Option<usize>,
) -> Result<()> {
    let total = frames.len();
    for (j, frame) in frames.iter().enumerate() {
        let missing = || ModelError::MissingFrame {
            model: model.to_string(),
            name: name.to_string(),
            frame: j,
        };
        let idx = frame.ok_or_else(missing)?;
        let next = frames[(j + 1) % total].ok_or_else(|| ModelError::MissingFrame {
            model: model.to_string(),
            name: name.to_string(),
            frame: (j + 1) % total,
        })?;
        let Some(tx) = textures[idx].as_mut() else {
            return Err(missing());
        };
        tx.anim_total = total as i32 * ANIM_CYCLE;
        tx.anim_min = j as i32 * ANIM_CYCLE;
        tx.anim_max = (j as i32 + 1) * ANIM_CYCLE;
        tx.anim_next = Some(next);
        tx.alternate_anims = other;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn mips(names: &[&str]) -> Vec<Option<MipTex>> {
        names.iter().map(|n| Some(MipTex::new(n, 16, 16))).collect()
    }

    fn names(loaded: &LoadedTextures) -> Vec<String> {
        loaded
            .textures
            .iter()
            .map(|t| t.as_ref().map(|t| t.name.clone()).unwrap_or_default())
            .collect()
    }

    #[test]
    fn test_unique_names() {
        let loaded = load_textures("m", mips(&["wall", "wall", "wall", "floor"]), None).unwrap();
        assert_eq!(names(&loaded), vec!["wall", "wall~1", "wall~2", "floor"]);
    }

    #[test]
    fn test_unique_name_overwrites_tail() {
        let long = "abcdefghijklmno"; // 15 chars, no room to append
        let loaded = load_textures("m", mips(&[long, long]), None).unwrap();
        assert_eq!(names(&loaded), vec!["abcdefghijklmno", "abcdefghijklm~1"]);
    }

    #[test]
    fn test_unique_name_skips_taken_tags() {
        let loaded = load_textures("m", mips(&["a", "a~1", "a"]), None).unwrap();
        assert_eq!(names(&loaded), vec!["a", "a~1", "a~2"]);
    }

    #[test]
    fn test_missing_entries_and_sky() {
        let mut lump = mips(&["wall", "sky1"]);
        lump.insert(1, None);
        let loaded = load_textures("m", lump, None).unwrap();
        assert!(loaded.textures[1].is_none());
        assert_eq!(loaded.skytexture, Some(2));
    }

    #[test]
    fn test_not_aligned() {
        let lump = vec![Some(MipTex::new("odd", 24, 16))];
        assert!(matches!(
            load_textures("m", lump, None),
            Err(ModelError::TextureNotAligned { width: 24, .. })
        ));
    }

    #[test]
    fn test_too_large() {
        let huge = MipTex {
            width: 65536,
            height: 65536,
            ..MipTex::new("huge", 16, 16)
        };
        assert!(matches!(
            load_textures("m", vec![Some(huge)], None),
            Err(ModelError::TextureTooLarge { width: 65536, height: 65536, .. })
        ));

        let lump = vec![Some(MipTex::new("big", 8192, 8192))];
        assert!(matches!(
            load_textures("m", lump, None),
            Err(ModelError::TextureTooLarge { .. })
        ));
    }

    #[test]
    fn test_offsets_relative_to_pixels() {
        let loaded = load_textures("m", mips(&["wall"]), None).unwrap();
        let tx = loaded.textures[0].as_ref().unwrap();
        assert_eq!(tx.offsets, [0, 256, 256 + 64, 256 + 64 + 16]);
        assert_eq!(tx.pixels.len(), 16 * 16 / 64 * 85);
    }

    #[test]
    fn test_animation_cycle_closure() {
        let lump = mips(&["+0slip", "+2slip", "wall", "+1slip", "+aslip", "+Bslip"]);
        let loaded = load_textures("m", lump, None).unwrap();
        let tx = &loaded.textures;

        for (start, frames) in [(0usize, 3usize), (4, 2)] {
            let mut cur = start;
            for _ in 0..frames {
                let t = tx[cur].as_ref().unwrap();
                assert!(t.anim_min < t.anim_max);
                assert_eq!(t.anim_total, frames as i32 * ANIM_CYCLE);
                cur = t.anim_next.unwrap();
            }
            assert_eq!(cur, start);
        }

        // +0 -> +1 -> +2
        assert_eq!(tx[0].as_ref().unwrap().anim_next, Some(3));
        assert_eq!(tx[3].as_ref().unwrap().anim_next, Some(1));
        // the two sets point at each other's first frame
        assert_eq!(tx[1].as_ref().unwrap().alternate_anims, Some(4));
        assert_eq!(tx[5].as_ref().unwrap().alternate_anims, Some(0));
        assert!(tx[2].as_ref().unwrap().anim_next.is_none());
    }

    #[test]
    fn test_missing_frame() {
        let lump = mips(&["+0lava", "+2lava"]);
        assert!(matches!(
            load_textures("m", lump, None),
            Err(ModelError::MissingFrame { frame: 1, .. })
        ));
    }

    #[test]
    fn test_bad_animating_texture() {
        let lump = mips(&["+zap"]);
        assert!(matches!(
            load_textures("m", lump, None),
            Err(ModelError::BadAnimatingTexture { .. })
        ));
    }

    struct Recorder {
        seen: Mutex<Vec<Option<(String, usize)>>>,
    }

    impl ModelFuncs for Recorder {
        fn texture_render_size(&self) -> usize {
            12
        }

        fn process_texture(&self, tx: Option<&mut Texture>) {
            let entry = tx.map(|t| (t.name.clone(), t.render.len()));
            self.seen.lock().push(entry);
        }
    }

    #[test]
    fn test_process_texture_hook() {
        let funcs = Recorder {
            seen: Mutex::new(Vec::new()),
        };
        let mut lump = mips(&["wall", "floor"]);
        lump.push(None);
        load_textures("m", lump, Some(&funcs)).unwrap();

        let seen = funcs.seen.lock();
        assert_eq!(
            *seen,
            vec![
                Some(("wall".to_string(), 12)),
                Some(("floor".to_string(), 12)),
                None,
            ]
        );
    }
}
