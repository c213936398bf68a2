use slabloc::{Slabloc, PAGE_SIZE};

fn print_alloc(allocator: &Slabloc, size: usize, addr: *mut u8) {
    let usable = unsafe { allocator.usable_size(addr) };
    println!("Requested {size} bytes of memory");
    println!("Received this address: {addr:?} ({usable} usable bytes)");
}

fn main() {
    let allocator = Slabloc::new();

    let addr1 = allocator.allocate(1);
    print_alloc(&allocator, 1, addr1);

    let addr2 = allocator.allocate(1024);
    print_alloc(&allocator, 1024, addr2);

    let addr3 = allocator.allocate(PAGE_SIZE);
    print_alloc(&allocator, PAGE_SIZE, addr3);

    unsafe {
        println!("\nFreeing everything...");
        allocator.free(addr1);
        allocator.free(addr2);
        allocator.free(addr3);

        println!("Interior pointer of a large object: {} usable bytes", {
            let large = allocator.allocate(3000);
            let size = allocator.usable_size(large.add(10));
            allocator.free(large);
            size
        });
    }

    println!("\nFreed blocks are reused before new memory is mapped:");
    let again = allocator.allocate(10);
    print_alloc(&allocator, 10, again);
    assert_eq!(again, addr1);

    println!("\nNow 100 objects of 20 bytes, all served from the 32 byte class:");
    let blocks: Vec<*mut u8> = (0..100).map(|_| allocator.allocate(20)).collect();
    println!("First {:?}, last {:?}", blocks[0], blocks[99]);

    unsafe {
        for block in blocks {
            allocator.free(block);
        }
    }
}
