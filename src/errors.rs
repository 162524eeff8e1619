use skeleton::BoneIndex;

error_chain! {
    foreign_links {
        Fmt(::std::fmt::Error);
        Io(::std::io::Error);
        ParseInt(::std::num::ParseIntError);
        ParseFloat(::std::num::ParseFloatError);
        Json(::json::Error);
    }

    errors {
        EmptyRasterization(bone: BoneIndex) {
            description("bone rasterized to zero voxels")
            display("bone {} rasterized to zero voxels", bone)
        }
        DisconnectedPartition(bone: BoneIndex, components: usize) {
            description("partition region is not singly connected")
            display("partition region of bone {} has {} connected components", bone, components)
        }
        EmptyDomain(bone: BoneIndex) {
            description("bone domain is empty")
            display("bone {} owns no voxels to build a domain from", bone)
        }
        MissingRadius(bone: BoneIndex) {
            description("envelope radius missing")
            display("bone {} has no envelope radius", bone)
        }
        NoHeatSource(bone: BoneIndex) {
            description("domain has no heat source")
            display("domain of bone {} contains no heat source voxel", bone)
        }
        NotPositiveDefinite(unknowns: usize) {
            description("diffusion system is not positive definite")
            display("diffusion system with {} unknowns is not positive definite", unknowns)
        }
        ZeroWeightSum {
            description("weights sum to zero")
            display("weights sum to zero")
        }
        Cancelled {
            description("job was cancelled")
            display("job was cancelled")
        }
        JobFailed(bone: BoneIndex, msg: String) {
            description("weight job failed")
            display("weight job for bone {} failed: {}", bone, msg)
        }
        BadVolume(msg: String) {
            description("malformed volume")
            display("malformed volume: {}", msg)
        }
        BadArmature(msg: String) {
            description("malformed armature")
            display("malformed armature: {}", msg)
        }
    }
}

macro_rules! check {
    ($b:expr) => {
        if !$b {
            use errors::Error;
            use errors::ErrorKind;
            Err(Error::from_kind(ErrorKind::Msg(format!(
                "expected: {}",
                stringify!($b)
            ))))
        } else {
            Ok(())
        }
    };
}
