use rand::Rng;
use tensorkv::{ALIGNMENT, AlignedBuffer, ContextError, CpuContext, DeviceContext, DeviceOption};

#[test]
fn test_alloc_alignment() {
    let ctx = CpuContext::new(DeviceOption::cpu()).unwrap();

    for nbytes in 1..10 {
        let (ptr, deallocator) = ctx.allocate(nbytes).unwrap();
        assert_eq!(ptr.as_ptr() as usize % ALIGNMENT, 0);
        unsafe { deallocator.deallocate(ptr) };
    }
}

#[test]
fn test_alloc_alignment_random_sizes() {
    let ctx = CpuContext::new(DeviceOption::cpu()).unwrap();
    let mut rng = rand::rng();

    for _ in 0..200 {
        let nbytes = rng.random_range(0..1 << 20);
        let (ptr, deallocator) = ctx.allocate(nbytes).unwrap();
        assert_eq!(ptr.as_ptr() as usize % ALIGNMENT, 0);
        assert!(deallocator.layout().size() >= nbytes);
        unsafe { deallocator.deallocate(ptr) };
    }
}

#[test]
fn test_alloc_dealloc_copy() {
    let ctx = CpuContext::new(DeviceOption::cpu()).unwrap();
    let nbytes = 10 * size_of::<f32>();

    let (src_ptr, src_deallocator) = ctx.allocate(nbytes).unwrap();
    let (dst_ptr, dst_deallocator) = ctx.allocate(nbytes).unwrap();
    let src = src_ptr.as_ptr().cast::<f32>();
    let dst = dst_ptr.as_ptr().cast::<f32>();

    unsafe {
        for i in 0..10 {
            src.add(i).write(i as f32);
        }
        ctx.copy_items_unchecked(10, src.cast_const(), dst);
        for i in 0..10 {
            assert_eq!(dst.add(i).read(), i as f32);
        }

        src_deallocator.deallocate(src_ptr);
        dst_deallocator.deallocate(dst_ptr);
    }
}

#[test]
fn test_copy_items_matches_source() {
    let ctx = CpuContext::new(DeviceOption::cpu()).unwrap();
    let mut rng = rand::rng();

    for n in [0usize, 1, 7, 64, 1000] {
        let src: Vec<f64> = (0..n).map(|_| rng.random()).collect();
        let mut dst = vec![0.0f64; n];
        ctx.copy_items(n, &src, &mut dst).unwrap();
        assert_eq!(src, dst);
    }
}

#[test]
fn test_copy_items_prefix_only() {
    let ctx = CpuContext::new(DeviceOption::cpu()).unwrap();
    let src = [1i64, 2, 3, 4, 5];
    let mut dst = [0i64; 5];

    ctx.copy_items(3, &src, &mut dst).unwrap();
    assert_eq!(dst, [1, 2, 3, 0, 0]);
}

#[test]
fn test_copy_items_source_too_short() {
    let ctx = CpuContext::new(DeviceOption::cpu()).unwrap();
    let src = [1u16; 4];
    let mut dst = [0u16; 8];

    let err = ctx.copy_items(6, &src, &mut dst).unwrap_err();
    assert_eq!(
        err,
        ContextError::OutOfBounds {
            requested: 6,
            available: 4,
        }
    );
}

#[test]
fn test_copy_bytes_into_aligned_buffer() {
    let ctx = CpuContext::new(DeviceOption::cpu()).unwrap();
    let payload: Vec<u8> = (0..=255).collect();

    let mut buffer = ctx.new_buffer(payload.len());
    ctx.copy_bytes(payload.len(), &payload, &mut buffer).unwrap();

    assert!(buffer.is_aligned_to(ALIGNMENT));
    assert_eq!(&buffer[..], payload.as_slice());
}

#[test]
fn test_buffers_from_many_threads() {
    let handles: Vec<_> = (0..4)
        .map(|t| {
            std::thread::spawn(move || {
                let ctx = CpuContext::new(DeviceOption::cpu().with_random_seed(t)).unwrap();
                for len in 0..64 {
                    let buffer = AlignedBuffer::new(len * 3);
                    assert!(buffer.is_aligned_to(ALIGNMENT));
                    let (ptr, deallocator) = ctx.allocate(len).unwrap();
                    assert_eq!(ptr.as_ptr() as usize % ALIGNMENT, 0);
                    unsafe { deallocator.deallocate(ptr) };
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn test_device_option_serde() {
    let option = DeviceOption {
        node_name: Some("trainer-0".to_string()),
        ..DeviceOption::cpu().with_random_seed(42)
    };

    let bytes = bincode::serde::encode_to_vec(&option, bincode::config::standard()).unwrap();
    let (decoded, _): (DeviceOption, usize) =
        bincode::serde::decode_from_slice(&bytes, bincode::config::standard()).unwrap();
    assert_eq!(decoded, option);

    let ctx = CpuContext::new(decoded).unwrap();
    assert_eq!(ctx.option().random_seed, Some(42));
    assert_eq!(ctx.option().node_name.as_deref(), Some("trainer-0"));
}
